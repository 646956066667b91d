//! Thin wrappers around `kicad-cli` and KiCad's bundled Python.
//!
//! Every export is a single `kicad-cli` invocation; this module only builds
//! the argument lists and reports failures.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Environment variable overriding the `kicad-cli` location.
pub const KICAD_CLI_ENV: &str = "KICAD_CLI";

#[cfg(target_os = "macos")]
const DEFAULT_KICAD_CLI: &str = "/Applications/KiCad/KiCad.app/Contents/MacOS/kicad-cli";
#[cfg(target_os = "windows")]
const DEFAULT_KICAD_CLI: &str = r"C:\Program Files\KiCad\9.0\bin\kicad-cli.exe";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DEFAULT_KICAD_CLI: &str = "/usr/bin/kicad-cli";

#[cfg(target_os = "macos")]
const DEFAULT_KICAD_PYTHON: &str =
    "/Applications/KiCad/KiCad.app/Contents/Frameworks/Python.framework/Versions/Current/bin/python3";
#[cfg(target_os = "windows")]
const DEFAULT_KICAD_PYTHON: &str = r"C:\Program Files\KiCad\9.0\bin\python.exe";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DEFAULT_KICAD_PYTHON: &str = "/usr/bin/python3";

/// Layers exported for every board, outer layers first.
pub const BASE_LAYERS: [&str; 9] = [
    "F.SilkS", "F.Paste", "F.Mask", "F.Cu", "B.Cu", "B.Mask", "B.Paste", "B.SilkS", "Edge.Cuts",
];

/// Errors from running external KiCad tools.
#[derive(Debug, Error)]
pub enum KicadError {
    /// The executable could not be located.
    #[error(
        "{program} not found. Install KiCad from https://www.kicad.org/ or set its path in the configuration file"
    )]
    NotFound {
        /// Name of the missing program.
        program: String,
    },

    /// The executable could not be started.
    #[error("Failed to execute {program}")]
    Spawn {
        /// Program path.
        program: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The executable exited with a failure status.
    #[error("{program} exited with status {status}: {stderr}")]
    Failed {
        /// Program path.
        program: PathBuf,
        /// Exit code, or -1 if killed by a signal.
        status: i32,
        /// Captured standard error (or standard output if stderr was empty).
        stderr: String,
    },
}

/// Builder for one external command invocation.
#[derive(Debug, Clone)]
pub struct CliCommand {
    program: PathBuf,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
}

impl CliCommand {
    /// Starts a command for `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Adds an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Adds several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Arguments collected so far.
    #[must_use]
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Runs the command to completion and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns [`KicadError::Spawn`] if the program cannot be started and
    /// [`KicadError::Failed`] if it exits unsuccessfully.
    pub fn run(self) -> Result<String, KicadError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        tracing::debug!(program = %self.program.display(), args = ?self.args, "Running");
        let output = cmd.output().map_err(|source| KicadError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(KicadError::Failed {
                program: self.program,
                status: output.status.code().unwrap_or(-1),
                stderr: if stderr.is_empty() { stdout } else { stderr },
            });
        }
        Ok(stdout)
    }
}

/// Names of the copper, mask, paste, silk and outline layers for a board
/// with `copper_layers` copper layers.
#[must_use]
pub fn layer_names(copper_layers: u32) -> Vec<String> {
    let mut names: Vec<String> = BASE_LAYERS.iter().map(ToString::to_string).collect();
    names.extend((1..=copper_layers.saturating_sub(2)).map(|i| format!("In{i}.Cu")));
    names
}

/// Options for `kicad-cli pcb render`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Camera side (top, bottom, left, right, front, back).
    pub side: String,
    /// Board rotation in degrees around X, Y and Z.
    pub rotation: Option<[f64; 3]>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 900,
            side: "top".to_string(),
            rotation: None,
        }
    }
}

/// A located `kicad-cli` executable.
#[derive(Debug, Clone)]
pub struct KicadCli {
    program: PathBuf,
}

impl KicadCli {
    /// Uses `program` as the `kicad-cli` executable.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Finds `kicad-cli`: `configured` path, then `$KICAD_CLI`, then `PATH`,
    /// then the platform's default install location.
    ///
    /// # Errors
    ///
    /// Returns [`KicadError::NotFound`] if none of these exist.
    pub fn locate(configured: Option<&Path>) -> Result<Self, KicadError> {
        let from_env = std::env::var_os(KICAD_CLI_ENV).map(PathBuf::from);
        let candidates = configured
            .map(Path::to_path_buf)
            .into_iter()
            .chain(from_env)
            .chain(which::which("kicad-cli").ok())
            .chain(std::iter::once(PathBuf::from(DEFAULT_KICAD_CLI)));

        for candidate in candidates {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "Using kicad-cli");
                return Ok(Self::new(candidate));
            }
        }
        Err(KicadError::NotFound {
            program: "kicad-cli".to_string(),
        })
    }

    /// Path of the executable.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Starts a `kicad-cli` command.
    #[must_use]
    pub fn command(&self) -> CliCommand {
        CliCommand::new(&self.program)
    }

    /// `kicad-cli --version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable cannot be run.
    pub fn version(&self) -> Result<String, KicadError> {
        self.command().arg("--version").run()
    }

    /// Plots the schematic to PDF.
    #[must_use]
    pub fn sch_pdf(&self, schematic: &Path, output: &Path) -> CliCommand {
        self.command()
            .args(["sch", "export", "pdf"])
            .arg(schematic)
            .arg("--output")
            .arg(output)
    }

    /// Exports the schematic netlist in the XML format read by [`crate::bom`].
    #[must_use]
    pub fn sch_bom_xml(&self, schematic: &Path, output: &Path) -> CliCommand {
        self.command()
            .args(["sch", "export", "python-bom"])
            .arg(schematic)
            .arg("--output")
            .arg(output)
    }

    /// Plots the given board layers to a single-page PDF.
    #[must_use]
    pub fn pcb_pdf(&self, board: &Path, output: &Path, layers: &[&str], mirror: bool) -> CliCommand {
        let cmd = self
            .command()
            .args(["pcb", "export", "pdf"])
            .arg(board)
            .arg("--output")
            .arg(output)
            .arg("--layers")
            .arg(layers.join(","))
            .arg("--include-border-title");
        if mirror {
            cmd.arg("--mirror")
        } else {
            cmd
        }
    }

    /// Plots gerbers for `layers` into `output_dir`.
    #[must_use]
    pub fn gerbers(&self, board: &Path, output_dir: &Path, layers: &[String]) -> CliCommand {
        self.command()
            .args(["pcb", "export", "gerbers"])
            .arg(board)
            .arg("--output")
            .arg(output_dir)
            .arg("--layers")
            .arg(layers.join(","))
    }

    /// Excellon drill files in mm with a gerber drill map.
    #[must_use]
    pub fn drill(&self, board: &Path, output_dir: &Path) -> CliCommand {
        let mut dir = output_dir.as_os_str().to_os_string();
        dir.push(std::path::MAIN_SEPARATOR_STR);
        self.command()
            .args(["pcb", "export", "drill"])
            .arg(board)
            .arg("--output")
            .arg(dir)
            .args([
                "--format",
                "excellon",
                "--excellon-zeros-format",
                "suppressleading",
                "--excellon-units",
                "mm",
                "--drill-origin",
                "absolute",
                "--excellon-separate-th",
                "--excellon-min-header",
                "--generate-map",
                "--map-format",
                "gerberx2",
            ])
    }

    /// Pick-and-place position file for both sides, in mm.
    #[must_use]
    pub fn position(&self, board: &Path, output: &Path) -> CliCommand {
        self.command()
            .args(["pcb", "export", "pos"])
            .arg(board)
            .arg("--output")
            .arg(output)
            .args(["--units", "mm", "--side", "both"])
    }

    /// 3D STEP model of the assembled board.
    #[must_use]
    pub fn step(&self, board: &Path, output: &Path) -> CliCommand {
        self.command()
            .args(["pcb", "export", "step"])
            .arg(board)
            .arg("--output")
            .arg(output)
    }

    /// Raytraced PNG render on a transparent background.
    #[must_use]
    pub fn render(&self, board: &Path, output: &Path, options: &RenderOptions) -> CliCommand {
        let cmd = self
            .command()
            .args(["pcb", "render"])
            .arg(board)
            .arg("--output")
            .arg(output)
            .arg("--width")
            .arg(options.width.to_string())
            .arg("--height")
            .arg(options.height.to_string())
            .arg("--side")
            .arg(&options.side)
            .args(["--background", "transparent", "--quality", "high"]);
        match options.rotation {
            Some([x, y, z]) => cmd.arg("--rotate").arg(format!("{x},{y},{z}")),
            None => cmd,
        }
    }
}

/// The `InteractiveHtmlBom` plugin, run with KiCad's Python.
#[derive(Debug, Clone)]
pub struct InteractiveBom {
    python: PathBuf,
    script: PathBuf,
}

impl InteractiveBom {
    /// Uses `script` with the configured Python, or KiCad's default one.
    #[must_use]
    pub fn new(python: Option<&Path>, script: &Path) -> Self {
        Self {
            python: python.map_or_else(|| PathBuf::from(DEFAULT_KICAD_PYTHON), Path::to_path_buf),
            script: script.to_path_buf(),
        }
    }

    /// Generates `output` (an `.html` file) excluding the `blacklist`
    /// designators.
    #[must_use]
    pub fn command(&self, board: &Path, output: &Path, blacklist: &[String]) -> CliCommand {
        let dest_dir = output.parent().unwrap_or_else(|| Path::new("."));
        let name = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        CliCommand::new(&self.python)
            .env("INTERACTIVE_HTML_BOM_NO_DISPLAY", "1")
            .arg(&self.script)
            .arg(board)
            .arg("--no-browser")
            .arg("--dest-dir")
            .arg(dest_dir)
            .args([
                "--dark-mode",
                "--show-fabrication",
                "--include-tracks",
                "--include-nets",
            ])
            .arg("--name-format")
            .arg(name)
            .arg("--blacklist")
            .arg(blacklist.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &CliCommand) -> Vec<String> {
        cmd.get_args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn two_layer_board_has_no_inner_layers() {
        let names = layer_names(2);
        assert_eq!(names.len(), 9);
        assert!(!names.iter().any(|n| n.starts_with("In")));
    }

    #[test]
    fn four_layer_board_has_two_inner_layers() {
        let names = layer_names(4);
        assert_eq!(&names[9..], ["In1.Cu", "In2.Cu"]);
    }

    #[test]
    fn single_layer_board() {
        assert_eq!(layer_names(1).len(), 9);
    }

    #[test]
    fn gerber_arguments() {
        let cli = KicadCli::new("kicad-cli");
        let cmd = cli.gerbers(
            Path::new("board.kicad_pcb"),
            Path::new("out/Gerber"),
            &layer_names(2)[..2],
        );
        assert_eq!(
            args(&cmd),
            [
                "pcb",
                "export",
                "gerbers",
                "board.kicad_pcb",
                "--output",
                "out/Gerber",
                "--layers",
                "F.SilkS,F.Paste"
            ]
        );
    }

    #[test]
    fn drill_output_has_trailing_separator() {
        let cli = KicadCli::new("kicad-cli");
        let cmd = cli.drill(Path::new("b.kicad_pcb"), Path::new("NC Drill"));
        let a = args(&cmd);
        assert_eq!(a[5], format!("NC Drill{}", std::path::MAIN_SEPARATOR));
        assert!(a.contains(&"--excellon-separate-th".to_string()));
    }

    #[test]
    fn render_rotation_argument() {
        let cli = KicadCli::new("kicad-cli");
        let options = RenderOptions {
            rotation: Some([0.0, 0.0, 45.0]),
            ..RenderOptions::default()
        };
        let a = args(&cli.render(Path::new("b.kicad_pcb"), Path::new("f.png"), &options));
        let pos = a.iter().position(|s| s == "--rotate").unwrap();
        assert_eq!(a[pos + 1], "0,0,45");
        assert!(a.contains(&"transparent".to_string()));
    }

    #[test]
    fn ibom_blacklist_joined() {
        let ibom = InteractiveBom::new(
            Some(Path::new("python3")),
            Path::new("generate_interactive_bom.py"),
        );
        let cmd = ibom.command(
            Path::new("b.kicad_pcb"),
            Path::new("out/board.ibom.html"),
            &["R5".to_string(), "D1".to_string()],
        );
        let a = args(&cmd);
        assert_eq!(a.last().map(String::as_str), Some("R5,D1"));
        let pos = a.iter().position(|s| s == "--name-format").unwrap();
        assert_eq!(a[pos + 1], "board.ibom");
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = CliCommand::new("/nonexistent/kicad-cli-for-tests")
            .arg("--version")
            .run()
            .unwrap_err();
        assert!(matches!(err, KicadError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_reports_status() {
        let err = CliCommand::new("sh")
            .args(["-c", "echo boom >&2; exit 3"])
            .run()
            .unwrap_err();
        match err {
            KicadError::Failed { status, stderr, .. } => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn env_and_stdout_are_passed_through() {
        let out = CliCommand::new("sh")
            .args(["-c", "echo $KICAD_OUTPUTS_TEST"])
            .env("KICAD_OUTPUTS_TEST", "hello")
            .run()
            .unwrap();
        assert_eq!(out, "hello");
    }
}
