use juniper::ID;

use crate::db::types::Key;


/// Converts a database key into the opaque `ID` we expose in the API.
pub(crate) fn from_key(key: Key) -> ID {
    ID::new(key.to_string())
}

/// Parses an `ID` from the API. Returns `None` if it cannot refer to any
/// row.
pub(crate) fn to_key(id: &ID) -> Option<Key> {
    id.parse().ok()
}


#[cfg(test)]
mod tests {
    use juniper::ID;

    use crate::db::types::Key;

    #[test]
    fn round_trip() {
        assert_eq!(super::from_key(Key(42)), ID::new("42"));
        assert_eq!(super::to_key(&ID::new("42")), Some(Key(42)));
    }

    #[test]
    fn garbage() {
        for s in ["", "abc", "4.2", " 42", "ckjd8s7f80001"] {
            assert_eq!(super::to_key(&ID::new(s)), None, "'{s}' was parsed");
        }
    }
}
