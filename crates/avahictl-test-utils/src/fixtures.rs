//! Test fixtures: canned tool output and temporary project directories.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// `avahi-browse -t -r _musicbox._tcp` output with one resolved service.
pub const MUSIC_BOX: &str = "\
+   eth0 IPv4 BeagleBoneMusicBox                            _musicbox._tcp       local
=   eth0 IPv4 BeagleBoneMusicBox                            _musicbox._tcp       local
   hostname = [beaglebone.local]
   address = [192.168.0.199]
   port = [8070]
   txt = [\"LivingRoom\"]
";

/// Builder for `avahi-browse -r` output.
///
/// # Example
///
/// ```rust
/// use avahictl_test_utils::fixtures::BrowseOutput;
///
/// let output = BrowseOutput::new("_http._tcp")
///     .add("printer")
///     .resolve("printer", "printer.local", "10.0.0.5", 631, &["rp=ipp"])
///     .build();
///
/// assert!(output.contains("hostname = [printer.local]"));
/// ```
#[derive(Debug, Clone)]
pub struct BrowseOutput {
    service_type: String,
    interface: String,
    protocol: String,
    lines: Vec<String>,
}

impl BrowseOutput {
    /// Output for `service_type`, seen on `eth0` over IPv4.
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            interface: "eth0".to_string(),
            protocol: "IPv4".to_string(),
            lines: Vec::new(),
        }
    }

    /// Use a different interface for the following events.
    pub fn on_interface(mut self, interface: &str, protocol: &str) -> Self {
        self.interface = interface.to_string();
        self.protocol = protocol.to_string();
        self
    }

    /// A `+` line.
    pub fn add(mut self, name: &str) -> Self {
        let line = self.event_line("+", name);
        self.lines.push(line);
        self
    }

    /// A `-` line.
    pub fn remove(mut self, name: &str) -> Self {
        let line = self.event_line("-", name);
        self.lines.push(line);
        self
    }

    /// A `=` line followed by its four detail lines.
    pub fn resolve(mut self, name: &str, hostname: &str, address: &str, port: u16, txt: &[&str]) -> Self {
        let txt = txt
            .iter()
            .map(|record| format!("\"{record}\""))
            .collect::<Vec<_>>()
            .join(" ");
        let header = self.event_line("=", name);
        self.lines.push(header);
        self.lines.push(format!("   hostname = [{hostname}]"));
        self.lines.push(format!("   address = [{address}]"));
        self.lines.push(format!("   port = [{port}]"));
        self.lines.push(format!("   txt = [{txt}]"));
        self
    }

    /// Any other line, verbatim.
    pub fn raw(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// The lines without trailing newlines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.clone()
    }

    /// The whole output, newline terminated.
    pub fn build(&self) -> String {
        let mut output = String::new();
        for line in &self.lines {
            output.push_str(line);
            output.push('\n');
        }
        output
    }

    fn event_line(&self, marker: &str, name: &str) -> String {
        format!(
            "{marker}   {} {} {name:<40} {:<20} local",
            self.interface, self.protocol, self.service_type
        )
    }
}

/// A temporary directory to run against, removed on drop.
///
/// # Example
///
/// ```rust
/// use avahictl_test_utils::fixtures::TestProject;
///
/// let project = TestProject::new().with_config(r#"{ "exitGraceMs": 10 }"#);
/// assert!(project.path().join("avahictl.json").exists());
/// ```
pub struct TestProject {
    temp_dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write a file relative to the project root.
    pub fn with_file(self, path: impl AsRef<Path>, contents: &str) -> Self {
        let full_path = self.temp_dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&full_path, contents).expect("Failed to write file");
        self
    }

    /// Write `avahictl.json`.
    pub fn with_config(self, contents: &str) -> Self {
        self.with_file("avahictl.json", contents)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
