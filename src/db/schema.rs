diesel::table! {
    comments (id) {
        id -> Integer,
        author_id -> Integer,
        post_id -> Integer,
        text -> Text,
        created -> Timestamp,
    }
}

diesel::table! {
    follows (id) {
        id -> Integer,
        user_id -> Integer,
        following_id -> Integer,
    }
}

diesel::table! {
    groups (id) {
        id -> Integer,
        title -> Text,
        slug -> Text,
        description -> Text,
    }
}

diesel::table! {
    posts (id) {
        id -> Integer,
        text -> Text,
        pub_date -> Timestamp,
        author_id -> Integer,
        image -> Nullable<Text>,
        group_id -> Nullable<Integer>,
    }
}

diesel::table! {
    users (id) {
        id -> Integer,
        username -> Text,
        email -> Text,
        password -> Text,
        date_joined -> Timestamp,
    }
}

diesel::joinable!(comments -> posts (post_id));
diesel::joinable!(comments -> users (author_id));
diesel::joinable!(posts -> groups (group_id));
diesel::joinable!(posts -> users (author_id));

diesel::allow_tables_to_appear_in_same_query!(comments, follows, groups, posts, users,);
