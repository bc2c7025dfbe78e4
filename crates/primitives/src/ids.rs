use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(id: &str) -> Result<Self, Self::Err> {
                Ok(Self(id.to_owned()))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

opaque_id! {
    /// Opaque identifier of a user account on the remote platform.
    UserId
}

opaque_id! {
    /// Opaque identifier of a running instance (a live session of a world).
    InstanceId
}

opaque_id! {
    /// Opaque identifier of a world (the static content an instance runs).
    WorldId
}

opaque_id! {
    /// Opaque identifier of a friend request, invite or invite request.
    RequestId
}

#[cfg(test)]
mod tests {
    use super::UserId;

    #[test]
    fn id_round_trips_through_serde() {
        let id = UserId::new("usr_1234");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"usr_1234\"");

        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn id_displays_bare() {
        let id = UserId::new("usr_1234");
        assert_eq!(id.to_string(), "usr_1234");
        assert_eq!(id.as_str(), "usr_1234");
    }
}
