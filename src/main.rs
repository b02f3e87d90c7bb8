#[macro_use]
extern crate rocket;

use yatube_api::config::Settings;
use yatube_api::logger;

#[launch]
fn rocket() -> _ {
    logger::init();
    let settings = Settings::from_env().expect("Failed to read settings");
    yatube_api::build(settings).expect("Failed to set up the database")
}
