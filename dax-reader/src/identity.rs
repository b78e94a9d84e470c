//! Reader identification

/// Address commands are matched against: `<hostname>_reader_<node_id>`
pub fn reader_host_id(node_id: &str) -> String {
    let hostname = gethostname::gethostname().to_string_lossy().to_string();
    host_id_for(&hostname, node_id)
}

pub fn host_id_for(hostname: &str, node_id: &str) -> String {
    format!("{hostname}_reader_{node_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_id_format() {
        assert_eq!(host_id_for("daq01", "2"), "daq01_reader_2");
    }

    #[test]
    fn test_reader_host_id_uses_machine_hostname() {
        let id = reader_host_id("7");
        assert!(id.ends_with("_reader_7"));
        assert!(id.len() > "_reader_7".len());
    }
}
