use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(SlotStatus {
    Available => "available",
    Booked => "booked",
});

str_enum!(AppointmentStatus {
    Confirmed => "confirmed",
});

str_enum!(MessageRole {
    Assistant => "assistant",
    Patient => "patient",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn slot_status_round_trip() {
        assert_eq!(SlotStatus::Available.as_str(), "available");
        assert_eq!(SlotStatus::from_str("booked").unwrap(), SlotStatus::Booked);
    }

    #[test]
    fn invalid_enum_value_rejected() {
        let err = SlotStatus::from_str("cancelled").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }
}
