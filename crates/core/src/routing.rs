//! Routing metadata stamped onto every event header.
//!
//! `Source` names the subsystem that raised the event, `Channel` the interaction
//! context it came through. Both are closed sets; their wire form is the
//! upper-case name (e.g. `CONTACT_CENTRE_API`, `CC`).

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Every member, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(DomainError::unknown($kind, other)),
                }
            }
        }
    };
}

closed_enum! {
    /// Originating subsystem of an event.
    Source, "source" {
        ActionExporter => "ACTION_EXPORTER",
        AddressResolution => "ADDRESS_RESOLUTION",
        CaseService => "CASE_SERVICE",
        ContactCentreApi => "CONTACT_CENTRE_API",
        FieldworkGateway => "FIELDWORK_GATEWAY",
        NotifyGateway => "NOTIFY_GATEWAY",
        ReceiptService => "RECEIPT_SERVICE",
        RespondentHome => "RESPONDENT_HOME",
        SampleLoader => "SAMPLE_LOADER",
        /// Events raised by automated test suites.
        IntegrationTests => "INTEGRATION_TESTS",
    }
}

closed_enum! {
    /// Originating interaction context of an event.
    Channel, "channel" {
        /// Assisted digital.
        Ad => "AD",
        Ar => "AR",
        /// Contact centre.
        Cc => "CC",
        /// Electronic questionnaire.
        Eq => "EQ",
        Field => "FIELD",
        Ppo => "PPO",
        Qm => "QM",
        /// Respondent home.
        Rh => "RH",
        Rm => "RM",
        Ro => "RO",
    }
}
