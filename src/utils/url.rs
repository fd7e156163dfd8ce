//! Data URL parsing
//!
//! Image attachments arrive as base64 data URLs; this module splits them
//! into the mime type and payload that typed binary request parts need.

/// A decoded `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub mime_type: &'a str,
    pub data: &'a str,
}

/// Split a base64 data URL into its mime type and payload.
///
/// Returns `None` when the string is not in the
/// `data:<mime>;base64,<payload>` shape.
///
/// # Examples
///
/// ```
/// use relais::utils::url::parse_data_url;
///
/// let parsed = parse_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
/// assert_eq!(parsed.mime_type, "image/png");
/// assert_eq!(parsed.data, "iVBORw0KGgo=");
/// assert!(parse_data_url("http://example.com/cat.png").is_none());
/// ```
pub fn parse_data_url(url: &str) -> Option<DataUrl<'_>> {
    let rest = url.strip_prefix("data:")?;
    let (mime_type, data) = rest.split_once(";base64,")?;
    if mime_type.is_empty() || data.is_empty() {
        return None;
    }
    Some(DataUrl { mime_type, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_data_urls() {
        let parsed = parse_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(parsed.mime_type, "image/png");
        assert_eq!(parsed.data, "iVBORw0KGgo=");
    }

    #[test]
    fn keeps_parameters_in_the_mime_segment() {
        let parsed = parse_data_url("data:image/jpeg;charset=binary;base64,AAAA").unwrap();
        assert_eq!(parsed.mime_type, "image/jpeg;charset=binary");
        assert_eq!(parsed.data, "AAAA");
    }

    #[test]
    fn rejects_malformed_data_urls() {
        assert!(parse_data_url("http://example.com/cat.png").is_none());
        assert!(parse_data_url("data:image/png,not-base64-marked").is_none());
        assert!(parse_data_url("data:;base64,payload").is_none());
        assert!(parse_data_url("data:image/png;base64,").is_none());
    }
}
