//! # Route Modules
//!
//! | Prefix                      | Module         |
//! |-----------------------------|----------------|
//! | `/v1/directives/*`          | [`directives`] |
//! | `/v1/extract`, `/v1/extract/stats` | [`extract`] |
//! | `/v1/emergency/*`           | [`emergency`]  |
//! | `/v1/executions/*`          | [`executions`] |

pub mod directives;
pub mod emergency;
pub mod executions;
pub mod extract;

use medx_core::PatientIdHash;

use crate::error::AppError;

/// Resolve the patient key from exactly one of a raw identifier (hashed
/// here, never kept) or an already-hashed hex key.
pub(crate) fn patient_key(
    patient_id: Option<&str>,
    patient_hash: Option<&str>,
) -> Result<PatientIdHash, AppError> {
    match (patient_id, patient_hash) {
        (Some(id), None) => Ok(PatientIdHash::from_patient_id(id)?),
        (None, Some(hash)) => Ok(PatientIdHash::from_hex(hash)?),
        (Some(_), Some(_)) => Err(AppError::Validation(
            "give either patient_id or patient_hash, not both".into(),
        )),
        (None, None) => Err(AppError::Validation(
            "one of patient_id or patient_hash is required".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_and_hashed_forms_agree() {
        let from_id = patient_key(Some("P1"), None).unwrap();
        let from_hash = patient_key(None, Some(&from_id.to_hex())).unwrap();
        assert_eq!(from_id, from_hash);
    }

    #[test]
    fn exactly_one_form_is_required() {
        assert!(patient_key(None, None).is_err());
        assert!(patient_key(Some("P1"), Some("00")).is_err());
        assert!(patient_key(None, Some("not-hex")).is_err());
    }
}
