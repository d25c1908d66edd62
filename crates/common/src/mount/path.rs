use crate::error::FsError;

/// Split a slash separated path into its components
///
/// Leading, trailing and doubled slashes are ignored. `.` and `..`
///  are rejected rather than resolved.
pub fn components(path: &str) -> Result<Vec<String>, FsError> {
    let mut out = Vec::new();
    for part in path.split('/') {
        match part {
            "" => continue,
            "." | ".." => return Err(FsError::InvalidPath(path.to_string())),
            part => out.push(part.to_string()),
        }
    }
    Ok(out)
}

/// Render components back into an absolute path
pub fn join(components: &[String]) -> String {
    format!("/{}", components.join("/"))
}

pub fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() <= path.len() && prefix.iter().zip(path).all(|(a, b)| a == b)
}

/// Split off the final component, failing for the root
pub(crate) fn split_last(path: &[String]) -> Result<(&[String], &str), FsError> {
    match path.split_last() {
        Some((name, parent)) => Ok((parent, name.as_str())),
        None => Err(FsError::InvalidPath("/".to_string())),
    }
}
