//! Validate a Flowcam project bundle.

use std::path::PathBuf;

use flowcam_project_model::LoadedProject;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating project at: {}", path.display());

    let project =
        LoadedProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    println!("  Name: {}", project.project.name);
    println!("  Version: {}", project.project.version);
    println!(
        "  Segment: {:.2}s - {:.2}s",
        project.segment.trim_start, project.segment.trim_end
    );
    println!("  Zoom keyframes: {}", project.segment.zoom_keyframes.len());
    println!("  Cursor samples: {}", project.mouse_positions.len());

    let errors = project.validate();
    if errors.is_empty() {
        println!("  Sources: All present");
        println!("\nProject is valid.");
        Ok(())
    } else {
        println!("\nValidation issues:");
        for error in &errors {
            println!("  - {error}");
        }
        anyhow::bail!("{} issue(s) found", errors.len())
    }
}
