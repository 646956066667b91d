//! Full manufacturing output run for one board.
//!
//! [`OutputJob::run`] recreates the output directory and produces every
//! selected deliverable in a fixed order, finishing with the release bundle.
//! The first failing step aborts the run.

use std::fs;
use std::path::{Path, PathBuf};

use crate::bom;
use crate::bundle::{self, BundleFormat};
use crate::compositor::Compositor;
use crate::config::{Config, Deliverables};
use crate::error::{ConfigError, OutputError, OutputResult};
use crate::kicad::{layer_names, InteractiveBom, KicadCli, RenderOptions};
use crate::pdfmerge;

/// Board file extension.
pub const BOARD_EXTENSION: &str = "kicad_pcb";

/// Schematic file extension.
pub const SCHEMATIC_EXTENSION: &str = "kicad_sch";

/// Layers plotted for the front assembly drawing.
pub const FRONT_ASSEMBLY_LAYERS: [&str; 3] = ["F.Fab", "F.SilkS", "Edge.Cuts"];

/// Layers plotted (mirrored) for the back assembly drawing.
pub const BACK_ASSEMBLY_LAYERS: [&str; 3] = ["B.Fab", "B.SilkS", "Edge.Cuts"];

const GERBER_DIR: &str = "Gerber";
const DRILL_DIR: &str = "NC Drill";
const TURNTABLE_DIR: &str = ".turntable";

/// Rotation about Z for each turntable frame, in degrees.
///
/// Frame `i` of `frames` is rotated by `360 * i / frames`, so the last frame
/// stops one step short of the first.
#[must_use]
pub fn turntable_angles(frames: u32) -> Vec<f64> {
    (0..frames)
        .map(|i| 360.0 * f64::from(i) / f64::from(frames))
        .collect()
}

/// Splits a board argument (`boards/amp` or `boards/amp.kicad_pcb`) into its
/// directory-qualified stem and bare name.
fn board_stem(board: &Path) -> (PathBuf, String) {
    let stem = match board.extension().and_then(|e| e.to_str()) {
        Some(BOARD_EXTENSION | SCHEMATIC_EXTENSION) => board.with_extension(""),
        _ => board.to_path_buf(),
    };
    let name = stem
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (stem, name)
}

/// `stem.ext`, keeping any dots already in the stem.
fn with_suffix(stem: &Path, extension: &str) -> PathBuf {
    let mut path = stem.as_os_str().to_os_string();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// What a run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSummary {
    /// Files and directories written, in production order.
    pub produced: Vec<PathBuf>,
    /// References of not-fitted components.
    pub not_fitted: Vec<String>,
    /// Release archive, when bundling was selected.
    pub bundle: Option<PathBuf>,
}

/// One output run for a board.
#[derive(Debug, Clone)]
pub struct OutputJob {
    name: String,
    board: PathBuf,
    schematic: PathBuf,
    copper_layers: u32,
    output_dir: PathBuf,
    config: Config,
}

impl OutputJob {
    /// Creates a job for `board` (with or without the `.kicad_pcb`
    /// extension). The schematic is expected next to it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if the board has no file name
    /// or `copper_layers` is zero.
    pub fn new(board: &Path, copper_layers: u32, config: Config) -> Result<Self, ConfigError> {
        let (stem, name) = board_stem(board);
        if name.is_empty() {
            return Err(ConfigError::ValidationError {
                message: format!("Invalid board path '{}'", board.display()),
            });
        }
        if copper_layers == 0 {
            return Err(ConfigError::ValidationError {
                message: "Board must have at least one copper layer".to_string(),
            });
        }

        Ok(Self {
            name,
            board: with_suffix(&stem, BOARD_EXTENSION),
            schematic: with_suffix(&stem, SCHEMATIC_EXTENSION),
            copper_layers,
            output_dir: config.outputs.output_dir.clone(),
            config,
        })
    }

    /// Overrides the configured output directory.
    #[must_use]
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Board name used for every output file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Board file.
    #[must_use]
    pub fn board(&self) -> &Path {
        &self.board
    }

    /// Schematic file.
    #[must_use]
    pub fn schematic(&self) -> &Path {
        &self.schematic
    }

    /// Directory the deliverables are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<board name><suffix>`
    #[must_use]
    pub fn output_file(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}{suffix}", self.name))
    }

    /// Path of the release archive.
    #[must_use]
    pub fn bundle_path(&self) -> PathBuf {
        let format = BundleFormat::from_name(&self.config.outputs.bundle_format)
            .unwrap_or(BundleFormat::Zip);
        self.output_file(format.suffix())
    }

    /// Runs every selected step.
    ///
    /// # Errors
    ///
    /// Returns the first error from any step. Files written by earlier steps
    /// are left in place.
    pub fn run(&self) -> OutputResult<OutputSummary> {
        self.config.validate()?;
        let cli = KicadCli::locate(self.config.kicad.cli_path.as_deref())?;
        match cli.version() {
            Ok(version) => {
                tracing::info!(
                    %version,
                    cli = %cli.program().display(),
                    board = %self.board.display(),
                    "Generating outputs"
                );
            }
            Err(e) => tracing::debug!(
                error = %e,
                cli = %cli.program().display(),
                "Could not query kicad-cli version"
            ),
        }

        let deliverables = self.config.outputs.deliverables;
        let mut summary = OutputSummary::default();

        clean_directory(&self.output_dir)?;

        if deliverables.contains(Deliverables::SCHEMATIC) {
            self.export_schematic(&cli, &mut summary)?;
        }
        if deliverables.intersects(Deliverables::BOM | Deliverables::IBOM) {
            self.export_bom(&cli, deliverables, &mut summary)?;
        }
        if deliverables.contains(Deliverables::IBOM) {
            self.export_ibom(&mut summary)?;
        }
        if deliverables.contains(Deliverables::GERBERS) {
            let dir = self.make_subdir(GERBER_DIR)?;
            let layers = layer_names(self.copper_layers);
            tracing::info!(layers = layers.len(), "Generating gerbers");
            cli.gerbers(&self.board, &dir, &layers).run()?;
            summary.produced.push(dir);
        }
        if deliverables.contains(Deliverables::DRILL) {
            let dir = self.make_subdir(DRILL_DIR)?;
            tracing::info!("Generating drill files");
            cli.drill(&self.board, &dir).run()?;
            summary.produced.push(dir);
        }
        if deliverables.contains(Deliverables::POSITION) {
            let pos = self.output_file(".pos");
            tracing::info!("Generating position file");
            cli.position(&self.board, &pos).run()?;
            summary.produced.push(pos);
        }
        if deliverables.contains(Deliverables::RENDER) {
            self.export_render(&cli, &mut summary)?;
        }
        if deliverables.contains(Deliverables::ANIMATION) {
            self.export_animation(&cli, &mut summary)?;
        }
        if deliverables.contains(Deliverables::STEP) {
            let step = self.output_file(".step");
            tracing::info!("Generating STEP model");
            cli.step(&self.board, &step).run()?;
            summary.produced.push(step);
        }
        if deliverables.contains(Deliverables::BUNDLE) {
            let archive = self.bundle_path();
            bundle::bundle(&self.output_dir, &archive, None)?;
            summary.bundle = Some(archive);
        }

        tracing::info!(
            produced = summary.produced.len(),
            not_fitted = summary.not_fitted.len(),
            "Outputs complete"
        );
        Ok(summary)
    }

    fn make_subdir(&self, name: &str) -> OutputResult<PathBuf> {
        let dir = self.output_dir.join(name);
        fs::create_dir_all(&dir).map_err(|e| OutputError::io(&dir, e))?;
        Ok(dir)
    }

    /// Schematic PDF, followed by the front and back assembly drawings.
    fn export_schematic(&self, cli: &KicadCli, summary: &mut OutputSummary) -> OutputResult<()> {
        let pdf = self.output_file(".pdf");
        let backend = if self.config.outputs.merge_pdfs {
            let backend = pdfmerge::resolve_backend();
            if backend.is_none() {
                tracing::warn!("No PDF merge backend found, assembly drawings kept separate");
            }
            backend
        } else {
            None
        };

        let schematic_pdf = if backend.is_some() {
            self.output_file(".schematic.pdf")
        } else {
            pdf.clone()
        };
        let front = self.output_file(".assembly-front.pdf");
        let back = self.output_file(".assembly-back.pdf");

        tracing::info!("Generating schematic PDF");
        cli.sch_pdf(&self.schematic, &schematic_pdf).run()?;
        cli.pcb_pdf(&self.board, &front, &FRONT_ASSEMBLY_LAYERS, false)
            .run()?;
        cli.pcb_pdf(&self.board, &back, &BACK_ASSEMBLY_LAYERS, true)
            .run()?;

        let parts = [schematic_pdf, front, back];
        match backend {
            Some(backend) => {
                pdfmerge::merge_pdf(backend.as_ref(), &parts, &pdf)?;
                for part in &parts {
                    fs::remove_file(part).map_err(|e| OutputError::io(part, e))?;
                }
                summary.produced.push(pdf);
            }
            None => summary.produced.extend(parts),
        }
        Ok(())
    }

    /// BOM table (when selected) and the not-fitted list used by the
    /// interactive BOM. The intermediate XML export is removed.
    fn export_bom(
        &self,
        cli: &KicadCli,
        deliverables: Deliverables,
        summary: &mut OutputSummary,
    ) -> OutputResult<()> {
        let xml = self.output_file(".xml");
        tracing::info!("Generating BOM");
        cli.sch_bom_xml(&self.schematic, &xml).run()?;

        let components = bom::load_components(&xml)?;
        if deliverables.contains(Deliverables::BOM) {
            let csv = self.output_file(".csv");
            bom::create_bom(&components, &csv)?;
            summary.produced.push(csv);
        }
        summary.not_fitted = bom::get_dnf_list(&components);
        fs::remove_file(&xml).map_err(|e| OutputError::io(&xml, e))?;

        if !summary.not_fitted.is_empty() {
            tracing::info!(references = ?summary.not_fitted, "Not fitted");
        }
        Ok(())
    }

    fn export_ibom(&self, summary: &mut OutputSummary) -> OutputResult<()> {
        let Some(script) = self.config.kicad.ibom_script.as_deref() else {
            tracing::warn!("No interactive BOM script configured, skipping");
            return Ok(());
        };

        let html = self.output_file(".ibom.html");
        tracing::info!("Generating interactive BOM");
        InteractiveBom::new(self.config.kicad.python_path.as_deref(), script)
            .command(&self.board, &html, &summary.not_fitted)
            .run()?;
        summary.produced.push(html);
        Ok(())
    }

    fn render_options(&self, rotation: Option<[f64; 3]>) -> RenderOptions {
        let animation = &self.config.animation;
        RenderOptions {
            width: animation.width,
            height: animation.height,
            side: animation.side.clone(),
            rotation,
        }
    }

    /// Board render, cropped in place to the board outline.
    fn export_render(&self, cli: &KicadCli, summary: &mut OutputSummary) -> OutputResult<()> {
        let png = self.output_file(".png");
        tracing::info!("Rendering board");
        cli.render(&self.board, &png, &self.render_options(None))
            .run()?;
        Compositor::new().crop_image(&png, &png)?;
        summary.produced.push(png);
        Ok(())
    }

    /// Turntable GIF rendered through a scratch directory.
    fn export_animation(&self, cli: &KicadCli, summary: &mut OutputSummary) -> OutputResult<()> {
        let scratch = self.make_subdir(TURNTABLE_DIR)?;
        let angles = turntable_angles(self.config.animation.frames);
        tracing::info!(frames = angles.len(), "Rendering turntable");

        let mut frames = Vec::with_capacity(angles.len());
        for (index, angle) in angles.into_iter().enumerate() {
            let frame = scratch.join(format!("frame_{index:03}.png"));
            tracing::debug!(index, angle, "Rendering frame");
            cli.render(&self.board, &frame, &self.render_options(Some([0.0, 0.0, angle])))
                .run()?;
            frames.push(frame);
        }

        let gif = self.output_file(".gif");
        Compositor::new().make_animation(&frames, &gif, self.config.animation.framerate)?;
        fs::remove_dir_all(&scratch).map_err(|e| OutputError::io(&scratch, e))?;
        summary.produced.push(gif);
        Ok(())
    }
}

/// Removes `dir` and everything in it, then recreates it empty.
///
/// # Errors
///
/// Returns [`OutputError::Io`] if the directory cannot be removed or created.
pub fn clean_directory(dir: &Path) -> OutputResult<()> {
    if dir.exists() {
        tracing::debug!(path = %dir.display(), "Removing previous outputs");
        fs::remove_dir_all(dir).map_err(|e| OutputError::io(dir, e))?;
    }
    fs::create_dir_all(dir).map_err(|e| OutputError::io(dir, e))
}
