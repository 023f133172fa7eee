/// Milliseconds since the Unix epoch. The engine never calls this itself;
/// the hosting service samples it once per operation so tests can supply
/// their own clock.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
