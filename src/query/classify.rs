//! Response status classification
//!
//! The HTTP status of a query response is fixed by the first result pulled
//! off the engine channel; errors in later results are embedded in the body
//! and never change the header.

use crate::query::ResultItem;

/// Transport-visible status class for a query response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 200. Includes the schema-absence case: a query against a missing
    /// measurement, tag, or field is an empty result, not a failure.
    Ok,
    /// 401
    Unauthorized,
    /// 500
    Internal,
}

/// Classify the first item received from the result channel.
///
/// Ordered taxonomy, first match wins:
/// 1. no item yet, placeholder, or no error: success
/// 2. authorization denied: unauthorized
/// 3. measurement/tag/field not found: success (empty body policy)
/// 4. anything else: internal error
pub fn classify_first_result(first: &ResultItem) -> StatusClass {
    let err = match first {
        Some(result) => match &result.error {
            Some(err) => err,
            None => return StatusClass::Ok,
        },
        None => return StatusClass::Ok,
    };

    if err.is_authorization() {
        StatusClass::Unauthorized
    } else if err.is_schema_not_found() {
        StatusClass::Ok
    } else {
        StatusClass::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::StatementResult;
    use crate::Error;

    fn item(err: Option<Error>) -> ResultItem {
        Some(StatementResult {
            statement_id: 0,
            series: Vec::new(),
            error: err,
        })
    }

    #[test]
    fn placeholder_classifies_ok() {
        assert_eq!(classify_first_result(&None), StatusClass::Ok);
    }

    #[test]
    fn no_error_classifies_ok() {
        assert_eq!(classify_first_result(&item(None)), StatusClass::Ok);
    }

    #[test]
    fn authorization_error_classifies_unauthorized() {
        let first = item(Some(Error::Unauthorized("denied".into())));
        assert_eq!(classify_first_result(&first), StatusClass::Unauthorized);
    }

    #[test]
    fn schema_absence_classifies_ok_not_unauthorized() {
        for err in [
            Error::MeasurementNotFound("cpu".into()),
            Error::TagNotFound("host".into()),
            Error::FieldNotFound("value".into()),
        ] {
            assert_eq!(classify_first_result(&item(Some(err))), StatusClass::Ok);
        }
    }

    #[test]
    fn anything_else_classifies_internal() {
        let first = item(Some(Error::Internal("shard offline".into())));
        assert_eq!(classify_first_result(&first), StatusClass::Internal);
    }
}
