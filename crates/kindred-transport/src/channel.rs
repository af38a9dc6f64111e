/// Normalizes a channel name: lowercase, with a leading `#`.
pub fn channel_name(raw: &str) -> String {
    let name = raw.trim().to_lowercase();
    if name.starts_with('#') {
        name
    } else {
        format!("#{name}")
    }
}
