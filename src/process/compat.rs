//! Platform-compatibility indirection for agent launches.
//!
//! When the agent binary lives inside an alternate OS layer (e.g. a WSL
//! distribution reached from a Windows host), the executable must be
//! wrapped in the layer's launcher and any paths handed to it translated
//! into the layer's format. Everything here is stateless string
//! translation; none of it participates in the concurrency core.

/// Translate a native Windows-style path into the compat layer's POSIX
/// form: `C:\Users\x\proj` → `/mnt/c/Users/x/proj`.
///
/// Paths that are already POSIX-style pass through unchanged.
#[must_use]
pub fn to_compat_path(native: &str) -> String {
    let bytes = native.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let drive = bytes[0].to_ascii_lowercase() as char;
        let rest = native[2..].replace('\\', "/");
        format!("/mnt/{drive}{rest}")
    } else {
        native.replace('\\', "/")
    }
}

/// Translate a compat-layer POSIX path back into its native Windows form:
/// `/mnt/c/Users/x/proj` → `C:\Users\x\proj`.
///
/// Paths outside the `/mnt/<drive>/` mount scheme pass through unchanged.
#[must_use]
pub fn to_native_path(compat: &str) -> String {
    let Some(rest) = compat.strip_prefix("/mnt/") else {
        return compat.to_owned();
    };
    let mut chars = rest.chars();
    match (chars.next(), chars.clone().next()) {
        (Some(drive), next) if drive.is_ascii_alphabetic() && matches!(next, None | Some('/')) => {
            let tail: String = chars.collect::<String>().replace('/', "\\");
            format!("{}:{tail}", drive.to_ascii_uppercase())
        }
        _ => compat.to_owned(),
    }
}

/// Rewrite an agent invocation to run through the compat launcher.
///
/// Returns the launcher as the new executable with `-e <binary> <args…>`
/// appended, the convention the launcher uses to exec a command inside
/// the layer without an interactive shell.
#[must_use]
pub fn wrap_command(launcher: &str, binary: &str, args: &[String]) -> (String, Vec<String>) {
    let mut wrapped = Vec::with_capacity(args.len() + 2);
    wrapped.push("-e".to_owned());
    wrapped.push(binary.to_owned());
    wrapped.extend(args.iter().cloned());
    (launcher.to_owned(), wrapped)
}
