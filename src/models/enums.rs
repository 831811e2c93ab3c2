use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
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

// pending -> success (approve), pending -> failed (cancel, failed approval).
// success and failed accept no further transition.
str_enum!(AppointmentStatus {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
});

str_enum!(AccountKind {
    Patient => "patient",
    Clinic => "clinic",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Success,
            AppointmentStatus::Failed,
        ] {
            assert_eq!(AppointmentStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_invalid_enum() {
        let err = AppointmentStatus::from_str("cancelled").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&AccountKind::Clinic).unwrap();
        assert_eq!(json, "\"clinic\"");
        let status: AppointmentStatus = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(status, AppointmentStatus::Success);
    }
}
