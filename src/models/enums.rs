use serde::{Deserialize, Serialize};

use super::InvalidEnum;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form is also the serde representation.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(DocumentType {
    MedicalReport => "medical_report",
    Prescription => "prescription",
    DiseaseLookup => "disease_lookup",
    MedicineSearch => "medicine_search",
    Chat => "chat",
});

str_enum!(TestStatus {
    Normal => "normal",
    Low => "low",
    High => "high",
    Watch => "watch",
    Danger => "danger",
    Info => "info",
});

str_enum!(RiskCategory {
    Normal => "Normal",
    Watch => "Watch",
    Danger => "Danger",
    Undetermined => "Undetermined",
});

str_enum!(Speaker {
    User => "user",
    Model => "model",
});
