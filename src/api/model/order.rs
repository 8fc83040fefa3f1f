//! The `orderBy` arguments of the list fields.

use crate::query::{Direction, Field, OrderBy};


/// Defines a GraphQL enum with `<field>_ASC`/`<field>_DESC` values and its
/// conversion into an `OrderBy`.
macro_rules! order_enum {
    (
        $(#[$attr:meta])*
        $name:ident { $( $variant:ident = $gql:tt => ($field:ident, $dir:ident) ),* $(,)? }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, juniper::GraphQLEnum)]
        pub(crate) enum $name {
            $(
                #[graphql(name = $gql)]
                $variant,
            )*
        }

        impl From<$name> for OrderBy {
            fn from(value: $name) -> Self {
                match value {
                    $(
                        $name::$variant => OrderBy {
                            field: Field::$field,
                            direction: Direction::$dir,
                        },
                    )*
                }
            }
        }
    };
}

order_enum! {
    /// Order of `users`. Ties are broken by ID.
    UserOrderByInput {
        IdAsc = "id_ASC" => (Id, Asc),
        IdDesc = "id_DESC" => (Id, Desc),
        NameAsc = "name_ASC" => (Name, Asc),
        NameDesc = "name_DESC" => (Name, Desc),
        EmailAsc = "email_ASC" => (Email, Asc),
        EmailDesc = "email_DESC" => (Email, Desc),
        CreatedAtAsc = "createdAt_ASC" => (CreatedAt, Asc),
        CreatedAtDesc = "createdAt_DESC" => (CreatedAt, Desc),
        UpdatedAtAsc = "updatedAt_ASC" => (UpdatedAt, Asc),
        UpdatedAtDesc = "updatedAt_DESC" => (UpdatedAt, Desc),
    }
}

order_enum! {
    /// Order of `posts` and `myPosts`. Ties are broken by ID.
    PostOrderByInput {
        IdAsc = "id_ASC" => (Id, Asc),
        IdDesc = "id_DESC" => (Id, Desc),
        TitleAsc = "title_ASC" => (Title, Asc),
        TitleDesc = "title_DESC" => (Title, Desc),
        BodyAsc = "body_ASC" => (Body, Asc),
        BodyDesc = "body_DESC" => (Body, Desc),
        PublishedAsc = "published_ASC" => (Published, Asc),
        PublishedDesc = "published_DESC" => (Published, Desc),
        CreatedAtAsc = "createdAt_ASC" => (CreatedAt, Asc),
        CreatedAtDesc = "createdAt_DESC" => (CreatedAt, Desc),
        UpdatedAtAsc = "updatedAt_ASC" => (UpdatedAt, Asc),
        UpdatedAtDesc = "updatedAt_DESC" => (UpdatedAt, Desc),
    }
}

order_enum! {
    /// Order of `comments`. Ties are broken by ID.
    CommentOrderByInput {
        IdAsc = "id_ASC" => (Id, Asc),
        IdDesc = "id_DESC" => (Id, Desc),
        TextAsc = "text_ASC" => (Text, Asc),
        TextDesc = "text_DESC" => (Text, Desc),
        CreatedAtAsc = "createdAt_ASC" => (CreatedAt, Asc),
        CreatedAtDesc = "createdAt_DESC" => (CreatedAt, Desc),
        UpdatedAtAsc = "updatedAt_ASC" => (UpdatedAt, Asc),
        UpdatedAtDesc = "updatedAt_DESC" => (UpdatedAt, Desc),
    }
}
