use clap::Parser;
use lfn_tools::init_tracing;
use lfn_training::{run_render, RenderArgs};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let report = run_render(RenderArgs::parse())?;
    for view in &report.views {
        println!("view {:4}: psnr {:.2} dB -> {}", view.view, view.psnr, view.path.display());
    }
    println!(
        "mean psnr {:.2} dB over {} views ({})",
        report.mean_psnr,
        report.views.len(),
        report.out_dir.display()
    );
    Ok(())
}
