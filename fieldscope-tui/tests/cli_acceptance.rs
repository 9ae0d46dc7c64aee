use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn session_path(&self) -> PathBuf {
        self.xdg_state.join("fieldscope/session.json")
    }

    /// Persist a session snapshot the way the store writes it.
    fn seed_session(&self) {
        let session = serde_json::json!({
            "token": "tok-123",
            "selected_field": {
                "id": "field123",
                "name": "Vigna Nord",
                "location": null,
            },
        });
        let path = self.session_path();
        fs::create_dir_all(path.parent().expect("missing session parent"))
            .expect("failed to create state directory");
        fs::write(&path, session.to_string()).expect("failed to seed session file");
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("fieldscope"));

    let mut command = Command::new(bin_path);
    command
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute fieldscope: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "fieldscope {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn help_lists_every_subcommand() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["--help"]);
    assert_success(&["--help"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in [
        "login", "logout", "register", "status", "fields", "select", "watch",
    ] {
        assert!(
            stdout.contains(subcommand),
            "expected '{subcommand}' in help output, got:\n{stdout}"
        );
    }
}

#[test]
fn status_reports_logged_out_session() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("logged out"), "got:\n{stdout}");
    assert!(
        stdout.contains("Selected field:  <none>"),
        "got:\n{stdout}"
    );
    assert!(stdout.contains("Run 'fieldscope login'"), "got:\n{stdout}");
}

#[test]
fn status_restores_persisted_session() {
    let env = CliTestEnv::new();
    env.seed_session();

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("logged in"), "got:\n{stdout}");
    assert!(
        stdout.contains("Vigna Nord (field123)"),
        "expected the persisted field selection, got:\n{stdout}"
    );
}

#[test]
fn fields_requires_login() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["fields"]);
    assert!(
        !output.status.success(),
        "fields should fail without a session"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Not logged in"), "got:\n{stderr}");
}

#[test]
fn select_requires_login() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["select", "field123"]);
    assert!(
        !output.status.success(),
        "select should fail without a session"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Not logged in"), "got:\n{stderr}");
}

#[test]
fn logout_clears_the_persisted_session() {
    let env = CliTestEnv::new();
    env.seed_session();

    let output = run_bin(&env, &["logout"]);
    assert_success(&["logout"], &output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Logged out."));
    assert!(
        !env.session_path().exists(),
        "session file should be removed on logout"
    );

    let again = run_bin(&env, &["logout"]);
    assert_success(&["logout"], &again);
    assert!(String::from_utf8_lossy(&again.stdout).contains("No active session."));
}
