use super::error::{CloudError, Result};

/// Parse the header blob that accompanies a signed upload URL
///
/// Expected format: "key1=value1&key2=value2". Only the first `=` of each pair
/// separates key from value, since values (signatures, dates) may contain `=`.
///
/// # Examples
///
/// ```
/// use cloud189::cloud::parse_request_header;
///
/// let headers = parse_request_header("a=1&b=val=ue").unwrap();
/// assert_eq!(headers[1], ("b".to_string(), "val=ue".to_string()));
/// ```
pub fn parse_request_header(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                CloudError::protocol(format!("malformed upload header '{}'", pair), raw)
            })?;
            if key.is_empty() {
                return Err(CloudError::protocol(
                    format!("upload header without a name '{}'", pair),
                    raw,
                ));
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Key under which the service returns the signed URL of a 1-based part number
pub fn part_key(part_number: usize) -> String {
    format!("partNumber_{}", part_number)
}

/// `partInfo` value announcing a 1-based part number and its name
pub fn part_info(part_number: usize, name: &str) -> String {
    format!("{}-{}", part_number, name)
}

/// Format file size for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
