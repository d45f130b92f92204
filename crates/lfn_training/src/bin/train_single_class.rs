use lfn_tools::init_tracing;
use lfn_training::{run_train, TrainArgs};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = TrainArgs::parse_with_config()?;
    let outcome = run_train(args)?;
    println!(
        "trained {} steps (final loss {:.5}); checkpoint at {}",
        outcome.steps,
        outcome.final_loss,
        outcome.final_checkpoint.display()
    );
    Ok(())
}
