use crate::error::{SegmentError, StoreError};

/// Database names the backend reserves for its own bookkeeping.
pub const RESERVED_PARTITIONS: [&str; 3] = ["admin", "local", "config"];

/// Prefix the backend uses for system tables.
pub const RESERVED_SEGMENT_PREFIX: &str = "system.";

/// Upper bound for `"{partition}.{segment}"` in bytes.
pub const MAX_QUALIFIED_NAME_LEN: usize = 64;

/// Checks a segment name against the backend naming rules.
///
/// Rules are applied in order and the first violation wins:
/// 1. the name must not be empty;
/// 2. it must not contain a null character;
/// 3. it must not start with [`RESERVED_SEGMENT_PREFIX`];
/// 4. it must not contain `$`;
/// 5. `partition.len() + 1 + name.len()` must not exceed [`MAX_QUALIFIED_NAME_LEN`].
///
/// # Errors
/// Returns [`StoreError::InvalidSegmentName`] describing the first rule broken.
pub fn validate_segment_name(partition: &str, name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::segment(SegmentError::Empty, "Empty string"));
    }

    if name.contains('\0') {
        return Err(StoreError::segment(SegmentError::InvalidCharacter, "Includes null character"));
    }

    if name.starts_with(RESERVED_SEGMENT_PREFIX) {
        return Err(StoreError::segment(SegmentError::ReservedPrefix, "Begins with \"system.\""));
    }

    if name.contains('$') {
        return Err(StoreError::segment(SegmentError::InvalidCharacter, "Contains \"$\""));
    }

    if qualified_len(partition, name) > MAX_QUALIFIED_NAME_LEN {
        return Err(StoreError::segment(
            SegmentError::TooLong,
            format!("Segment and partition name lengths exceed {MAX_QUALIFIED_NAME_LEN} characters"),
        ));
    }

    Ok(())
}

/// Rejects partition names the backend reserves, and empty ones.
///
/// # Errors
/// Returns [`StoreError::InvalidPartition`].
pub fn validate_partition_name(partition: &str) -> Result<(), StoreError> {
    if partition.trim().is_empty() {
        return Err(StoreError::InvalidPartition {
            message: "Cache partition name cannot be empty".into(),
            context: None,
        });
    }

    if RESERVED_PARTITIONS.contains(&partition) {
        return Err(StoreError::InvalidPartition {
            message: "Cache partition name cannot be \"admin\", \"local\", or \"config\"".into(),
            context: Some(partition.to_owned().into()),
        });
    }

    Ok(())
}

const fn qualified_len(partition: &str, name: &str) -> usize {
    partition.len() + 1 + name.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(res: Result<(), StoreError>) -> SegmentError {
        match res {
            Err(StoreError::InvalidSegmentName { reason, .. }) => reason,
            other => panic!("expected segment error, got {other:?}"),
        }
    }

    #[test]
    fn empty_name_is_rejected_first() {
        let err = validate_segment_name("unit-testing", "").unwrap_err();
        assert_eq!(err.message(), "Empty string");
    }

    #[test]
    fn rules_are_checked_in_order() {
        assert_eq!(reason(validate_segment_name("p", "\0test")), SegmentError::InvalidCharacter);
        assert_eq!(reason(validate_segment_name("p", "system.")), SegmentError::ReservedPrefix);
        // reserved prefix is reported before the `$` rule
        assert_eq!(reason(validate_segment_name("p", "system.$x")), SegmentError::ReservedPrefix);
        assert_eq!(reason(validate_segment_name("p", "te$t")), SegmentError::InvalidCharacter);
    }

    #[test]
    fn length_accounts_for_partition_and_separator() {
        let partition = "unit-testing";
        let fits = "a".repeat(MAX_QUALIFIED_NAME_LEN - partition.len() - 1);
        assert!(validate_segment_name(partition, &fits).is_ok());

        let over = format!("{fits}a");
        assert_eq!(reason(validate_segment_name(partition, &over)), SegmentError::TooLong);

        let hundred = "0123456789".repeat(10);
        assert_eq!(reason(validate_segment_name(partition, &hundred)), SegmentError::TooLong);
    }

    #[test]
    fn plain_names_pass() {
        assert!(validate_segment_name("unit-testing", "hereisavalidname").is_ok());
        assert!(validate_segment_name("unit-testing", "system").is_ok());
    }

    #[test]
    fn reserved_partitions_are_rejected() {
        for name in RESERVED_PARTITIONS {
            let err = validate_partition_name(name).unwrap_err();
            assert_eq!(
                err.message(),
                "Cache partition name cannot be \"admin\", \"local\", or \"config\""
            );
        }
        assert!(validate_partition_name("").is_err());
        assert!(validate_partition_name("unit-testing").is_ok());
    }
}
