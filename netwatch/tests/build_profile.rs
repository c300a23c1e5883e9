//! Panic isolation in the orchestrator relies on unwinding, so no build
//! profile may switch it off.

const WORKSPACE_MANIFEST: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../Cargo.toml"));

/// Lines of every `[profile.*]` table in the manifest.
fn profile_lines(manifest: &str) -> Vec<(String, String)> {
    let mut current = None;
    let mut lines = Vec::new();
    for line in manifest.lines().map(str::trim) {
        if line.starts_with('[') {
            current = line
                .strip_prefix("[profile.")
                .and_then(|rest| rest.strip_suffix(']'))
                .map(str::to_string);
            continue;
        }
        if let Some(profile) = &current {
            if !line.is_empty() && !line.starts_with('#') {
                lines.push((profile.clone(), line.to_string()));
            }
        }
    }
    lines
}

#[test]
fn profiles_keep_unwinding() {
    let profiles = profile_lines(WORKSPACE_MANIFEST);
    assert!(profiles.iter().any(|(name, _)| name == "release"));
    for (profile, line) in profiles {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        assert_ne!(compact, "panic=\"abort\"", "profile `{profile}` aborts on panic");
    }
}
