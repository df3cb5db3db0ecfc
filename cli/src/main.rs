//! `safe-rollout` CLI: run the safe control loop and report model accuracy.

mod plot;

use anyhow::{Context, Result};
use clap::Parser;
use control_core::{
    CbfConfig, ControlLoop, ControlLoopConfig, DynamicsMode, GpConfig, GpDynamicsModel,
    HistorySummary,
};
use sim::{save_json, RobotConfig, RolloutLog, UnicycleEnv};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "safe-rollout",
    about = "Safe goal-seeking rollout with a learned disturbance model"
)]
struct Cli {
    /// Nominal dynamics family
    #[arg(long, value_enum, default_value_t = DynamicsMode::Unicycle)]
    dynamics_mode: DynamicsMode,
    /// Uncertainty multiplier on the disturbance std (k_d)
    #[arg(long, default_value_t = 1.5)]
    k_d: f64,
    /// Barrier decay rate (gamma_b)
    #[arg(long, default_value_t = 0.5)]
    gamma_b: f64,
    /// Robot configuration (JSON); built-in workspace when omitted
    #[arg(long)]
    robot_config: Option<PathBuf>,
    /// Number of control ticks
    #[arg(long, default_value_t = 3000)]
    steps: usize,
    /// Random seed for the injected disturbance
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Inject random disturbance (overrides the config file)
    #[arg(long)]
    noisy: bool,
    /// Write per-dimension traces and confidence bands to a JSON file
    #[arg(long)]
    output: Option<PathBuf>,
    /// Plot actual vs predicted values with confidence bands (.svg or .png)
    #[arg(long)]
    plot: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut robot = match &cli.robot_config {
        Some(path) => RobotConfig::load(path)
            .with_context(|| format!("loading robot config {}", path.display()))?,
        None => RobotConfig::default(),
    };
    robot.noisy |= cli.noisy;

    let loop_config = ControlLoopConfig {
        steps: cli.steps,
        k_d: cli.k_d,
        gamma_b: cli.gamma_b,
        ..ControlLoopConfig::default()
    };

    let env = UnicycleEnv::new(robot, cli.dynamics_mode, cli.seed)?;
    let model = GpDynamicsModel::new(cli.dynamics_mode, env.config.dt, GpConfig::default());

    info!(
        steps = cli.steps,
        mode = ?cli.dynamics_mode,
        k_d = cli.k_d,
        gamma_b = cli.gamma_b,
        seed = cli.seed,
        "Running rollout"
    );
    let start = std::time::Instant::now();

    let mut control_loop =
        ControlLoop::with_barrier_filter(env, model, loop_config, CbfConfig::default());
    control_loop.run()?;
    let history = control_loop.into_history();

    let summary = history.summary();
    info!(
        ticks = history.len(),
        episodes = summary.episodes,
        goals = summary.goals_reached,
        total_cost = summary.total_cost,
        "Done in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    print_summary(&summary);

    if let Some(ppath) = &cli.plot {
        plot::save_rollout_plot(&history, ppath)
            .with_context(|| format!("plotting rollout to {}", ppath.display()))?;
        info!("Plot saved to {}", ppath.display());
    }

    if let Some(opath) = cli.output {
        let log = RolloutLog {
            dynamics_mode: cli.dynamics_mode,
            seed: cli.seed,
            k_d: cli.k_d,
            gamma_b: cli.gamma_b,
            steps: cli.steps,
            summary,
            history,
        };
        save_json(&log, &opath)?;
        info!("Rollout saved to {}", opath.display());
    }

    Ok(())
}

fn print_summary(summary: &HistorySummary) {
    println!("Mean model error = {:?}", summary.mean_abs_error);
    println!("Max std = {:?}", summary.max_std);
    println!("Band coverage = {:?}", summary.coverage);
}
