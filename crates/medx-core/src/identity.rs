//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier namespace in the engine. You cannot
//! pass a `HospitalId` where an `AccessorId` is expected, and a raw patient
//! identifier cannot be stored at all: it must first become a
//! [`PatientIdHash`].
//!
//! ## Security Invariant
//!
//! `PatientIdHash` is a one-way SHA-256 over a domain-separated encoding of
//! the raw identifier. Its `Debug` output is truncated so the full key does
//! not end up in log lines by accident.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::digest::decode_hex_32;
use crate::error::ValidationError;

const PATIENT_DOMAIN_TAG: &[u8] = b"medx/patient-id/v1\0";

/// Opaque, one-way hash of a patient identifier. The Store's only key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatientIdHash([u8; 32]);

impl PatientIdHash {
    /// Hash a raw patient identifier. Surrounding whitespace is ignored.
    pub fn from_patient_id(patient_id: &str) -> Result<Self, ValidationError> {
        let trimmed = patient_id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyIdentifier { kind: "patient id" });
        }
        let mut hasher = Sha256::new();
        hasher.update(PATIENT_DOMAIN_TAG);
        hasher.update(trimmed.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Ok(Self(bytes))
    }

    /// Parse the 64-character hex form (as returned by the API).
    pub fn from_hex(hex: &str) -> Result<Self, ValidationError> {
        decode_hex_32(hex, "patient id hash").map(Self)
    }

    /// Return the raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for PatientIdHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for PatientIdHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.0.iter().take(4).map(|b| format!("{b:02x}")).collect();
        write!(f, "PatientIdHash({prefix}...)")
    }
}

impl Serialize for PatientIdHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PatientIdHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Construct from a non-empty string. Surrounding whitespace is trimmed.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::EmptyIdentifier { kind: $kind });
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Borrow the identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;
            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a hospital or care facility issuing emergency requests.
    /// Doubles as the signing derivation path for that hospital.
    HospitalId,
    "hospital id"
);

string_id!(
    /// Identity of whoever touched a record, as supplied by the identity
    /// provider (`hospital:H-17`, `system:retention-sweep`, ...).
    AccessorId,
    "accessor id"
);

string_id!(
    /// Identifier of the external death-confirmation event.
    TriggerEventId,
    "trigger event id"
);

string_id!(
    /// Transplant recipient identifier assigned by the organ network.
    RecipientId,
    "recipient id"
);

string_id!(
    /// Transplant center or research institution identifier.
    FacilityId,
    "facility id"
);

string_id!(
    /// Reference into the off-chain PHI blob store.
    BlobRef,
    "blob reference"
);

impl AccessorId {
    /// The accessor recorded for background retention sweeps.
    pub fn retention_sweep() -> Self {
        Self("system:retention-sweep".to_string())
    }

    /// The accessor recorded for post-mortem execution reads.
    pub fn execution_engine() -> Self {
        Self("system:execution-engine".to_string())
    }

    /// Accessor for a hospital acting through the emergency path.
    pub fn hospital(hospital: &HospitalId) -> Self {
        Self(format!("hospital:{hospital}"))
    }
}

/// Unique identifier for a post-mortem execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    /// Generate a new random execution identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
