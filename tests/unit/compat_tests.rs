//! Unit tests for the platform-compat path translation and command wrap.

use agent_console::process::compat::{to_compat_path, to_native_path, wrap_command};

#[test]
fn windows_paths_translate_to_mount_form() {
    assert_eq!(
        to_compat_path(r"C:\Users\dev\project"),
        "/mnt/c/Users/dev/project"
    );
    assert_eq!(to_compat_path(r"d:\work"), "/mnt/d/work");
}

#[test]
fn posix_paths_pass_through_unchanged() {
    assert_eq!(to_compat_path("/home/dev/project"), "/home/dev/project");
}

#[test]
fn mount_paths_translate_back_to_native_form() {
    assert_eq!(
        to_native_path("/mnt/c/Users/dev/project"),
        r"C:\Users\dev\project"
    );
}

#[test]
fn non_mount_paths_pass_through_unchanged() {
    assert_eq!(to_native_path("/opt/tools"), "/opt/tools");
    assert_eq!(to_native_path("relative/path"), "relative/path");
}

#[test]
fn translation_round_trips() {
    let native = r"E:\repos\agent-console";
    assert_eq!(to_native_path(&to_compat_path(native)), native);
}

#[test]
fn wrapped_command_uses_the_launcher_exec_convention() {
    let args = vec!["--print".to_owned(), "--verbose".to_owned()];
    let (program, wrapped) = wrap_command("wsl.exe", "claude", &args);

    assert_eq!(program, "wsl.exe");
    assert_eq!(wrapped, vec!["-e", "claude", "--print", "--verbose"]);
}
