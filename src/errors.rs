//! Start-up and infrastructure errors.
//!
//! Request handling reports failures through [`crate::types::ApiError`];
//! this chain covers everything that happens before Rocket starts serving.

error_chain! {
    foreign_links {
        Var(::std::env::VarError);
        ParseInt(::std::num::ParseIntError);
        R2D2(::r2d2::Error);
    }

    errors {
        Migration(reason: String) {
            description("failed to run migrations")
            display("failed to run migrations: {}", reason)
        }

        InvalidSetting(name: &'static str, reason: String) {
            description("invalid setting")
            display("invalid setting {}: {}", name, reason)
        }
    }
}
