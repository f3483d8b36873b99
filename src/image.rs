//! Checks over raw SQLite database images (the bytes of a database file).

use crate::error::SqliteDualError;

/// The 16-byte magic string every SQLite database file starts with.
pub const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Size of the database header at the start of page 1.
pub const HEADER_LEN: usize = 100;

/// Fields of the 100-byte database header that callers care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Page size in bytes (the on-disk value 1 is reported as 65536)
    pub page_size: u32,
    /// File format write version: 1 = rollback journal, 2 = WAL
    pub write_version: u8,
    /// File format read version: 1 = rollback journal, 2 = WAL
    pub read_version: u8,
    /// File change counter
    pub change_counter: u32,
    /// In-header database size in pages (may be 0 in files written by old engines)
    pub page_count: u32,
}

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Parse and sanity-check the header of a database image.
///
/// # Errors
///
/// Returns `SqliteDualError::InvalidFormat` if the image is shorter than the header, lacks
/// the magic string, or declares a page size SQLite would not accept.
pub fn parse_header(bytes: &[u8]) -> Result<ImageHeader, SqliteDualError> {
    if bytes.len() < HEADER_LEN {
        return Err(SqliteDualError::InvalidFormat(format!(
            "image is {} bytes, shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    if &bytes[..16] != SQLITE_MAGIC {
        return Err(SqliteDualError::InvalidFormat(
            "missing \"SQLite format 3\" magic".into(),
        ));
    }

    let raw_page_size = u16::from_be_bytes([bytes[16], bytes[17]]);
    let page_size = match raw_page_size {
        1 => 65_536,
        n if (512..=32_768).contains(&n) && n.is_power_of_two() => u32::from(n),
        n => {
            return Err(SqliteDualError::InvalidFormat(format!(
                "invalid page size {n}"
            )));
        }
    };

    let write_version = bytes[18];
    let read_version = bytes[19];
    if !(1..=2).contains(&write_version) || !(1..=2).contains(&read_version) {
        return Err(SqliteDualError::InvalidFormat(format!(
            "unsupported file format versions {write_version}/{read_version}"
        )));
    }

    Ok(ImageHeader {
        page_size,
        write_version,
        read_version,
        change_counter: be_u32(bytes, 24),
        page_count: be_u32(bytes, 28),
    })
}

/// Validate seed bytes before handing them to an engine.
///
/// An empty slice is a valid image of an empty database and yields `None`.
///
/// # Errors
///
/// Returns `SqliteDualError::InvalidFormat` if the header is malformed or the image length is
/// not a whole number of pages.
pub fn validate_image(bytes: &[u8]) -> Result<Option<ImageHeader>, SqliteDualError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let header = parse_header(bytes)?;
    let page_size = header.page_size as usize;
    if bytes.len() % page_size != 0 {
        return Err(SqliteDualError::InvalidFormat(format!(
            "image length {} is not a multiple of the page size {page_size}",
            bytes.len()
        )));
    }
    Ok(Some(header))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_image(page_size: u16) -> Vec<u8> {
        let size = if page_size == 1 { 65_536 } else { page_size as usize };
        let mut image = vec![0u8; size];
        image[..16].copy_from_slice(SQLITE_MAGIC);
        image[16..18].copy_from_slice(&page_size.to_be_bytes());
        image[18] = 1;
        image[19] = 1;
        image[24..28].copy_from_slice(&7u32.to_be_bytes());
        image[28..32].copy_from_slice(&1u32.to_be_bytes());
        image
    }

    #[test]
    fn parses_header_fields() {
        let header = parse_header(&minimal_image(4096)).unwrap();
        assert_eq!(header.page_size, 4096);
        assert_eq!(header.change_counter, 7);
        assert_eq!(header.page_count, 1);
    }

    #[test]
    fn page_size_one_means_65536() {
        let header = validate_image(&minimal_image(1)).unwrap().unwrap();
        assert_eq!(header.page_size, 65_536);
    }

    #[test]
    fn empty_image_is_valid() {
        assert!(validate_image(&[]).unwrap().is_none());
    }

    #[test]
    fn rejects_garbage_and_truncation() {
        assert!(matches!(
            validate_image(b"definitely not a database"),
            Err(SqliteDualError::InvalidFormat(_))
        ));

        let mut bad_magic = minimal_image(1024);
        bad_magic[0] = b'X';
        assert!(validate_image(&bad_magic).is_err());

        let mut bad_page = minimal_image(1024);
        bad_page[16..18].copy_from_slice(&1000u16.to_be_bytes());
        assert!(validate_image(&bad_page).is_err());

        let mut truncated = minimal_image(1024);
        truncated.truncate(700);
        assert!(validate_image(&truncated).is_err());
    }
}
