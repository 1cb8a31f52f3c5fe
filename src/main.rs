use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use fcd_lesion_eval::cli::{Cli, Commands, CommonArgs};
use fcd_lesion_eval::config::EvalConfig;
use fcd_lesion_eval::ctx::Ctx;
use fcd_lesion_eval::io::summary::{build_summary, format_summary};
use fcd_lesion_eval::pipeline::stage0_scaffold::Stage0Scaffold;
use fcd_lesion_eval::pipeline::stage1_cohort::Stage1Cohort;
use fcd_lesion_eval::pipeline::stage2_inputs::Stage2Inputs;
use fcd_lesion_eval::pipeline::stage3_predict::Stage3Predict;
use fcd_lesion_eval::pipeline::stage4_cluster::Stage4Cluster;
use fcd_lesion_eval::pipeline::stage5_metrics::Stage5Metrics;
use fcd_lesion_eval::pipeline::stage6_roc::Stage6Roc;
use fcd_lesion_eval::pipeline::stage7_threshold_search::Stage7ThresholdSearch;
use fcd_lesion_eval::pipeline::stage8_saliency::Stage8Saliency;
use fcd_lesion_eval::pipeline::stage9_output::Stage9Output;
use fcd_lesion_eval::pipeline::{Pipeline, Stage};
use fcd_lesion_eval::predict::LinearLesionModel;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let ctx = match cli.command {
        Commands::Predict(args) => {
            let mut config = args.common.build_config()?;
            args.apply_dropout(&mut config);
            let mut ctx = new_ctx("predict", &args.common, config)?;
            ctx.model = Some(load_model(&args.model)?);
            run(&mut ctx, vec![
                Box::new(Stage0Scaffold::new()),
                Box::new(Stage1Cohort::new()),
                Box::new(Stage2Inputs::new(true)),
                Box::new(Stage3Predict::new(true)),
                Box::new(Stage9Output::new()),
            ])?;
            ctx
        }
        Commands::Cluster(common) => {
            let config = common.build_config()?;
            let mut ctx = new_ctx("cluster", &common, config)?;
            run(&mut ctx, vec![
                Box::new(Stage0Scaffold::new()),
                Box::new(Stage1Cohort::new()),
                Box::new(Stage2Inputs::new(false)),
                Box::new(Stage3Predict::new(false)),
                Box::new(Stage4Cluster::new()),
                Box::new(Stage9Output::new()),
            ])?;
            ctx
        }
        Commands::Evaluate(args) => {
            let config = args.common.build_config()?;
            let mut ctx = new_ctx("evaluate", &args.common, config)?;
            if let Some(path) = &args.model {
                ctx.model = Some(load_model(path)?);
            }
            let with_features = ctx.model.is_some();
            run(&mut ctx, vec![
                Box::new(Stage0Scaffold::new()),
                Box::new(Stage1Cohort::new()),
                Box::new(Stage2Inputs::new(with_features)),
                Box::new(Stage3Predict::new(false)),
                Box::new(Stage4Cluster::new()),
                Box::new(Stage5Metrics::new()),
                Box::new(Stage6Roc::new()),
                Box::new(Stage9Output::new()),
            ])?;
            ctx
        }
        Commands::OptimizeThreshold(args) => {
            let config = args.common.build_config()?;
            let mut ctx = new_ctx("optimize-threshold", &args.common, config)?;
            if let Some(path) = &args.model {
                ctx.model = Some(load_model(path)?);
            }
            let with_features = ctx.model.is_some();
            run(&mut ctx, vec![
                Box::new(Stage0Scaffold::new()),
                Box::new(Stage1Cohort::new()),
                Box::new(Stage2Inputs::new(with_features)),
                Box::new(Stage3Predict::new(false)),
                Box::new(Stage7ThresholdSearch::new()),
                Box::new(Stage9Output::new()),
            ])?;
            ctx
        }
        Commands::Saliency(args) => {
            let mut config = args.common.build_config()?;
            args.apply_dropout(&mut config);
            let mut ctx = new_ctx("saliency", &args.common, config)?;
            ctx.model = Some(load_model(&args.model)?);
            run(&mut ctx, vec![
                Box::new(Stage0Scaffold::new()),
                Box::new(Stage1Cohort::new()),
                Box::new(Stage2Inputs::new(true)),
                Box::new(Stage8Saliency::new()),
                Box::new(Stage9Output::new()),
            ])?;
            ctx
        }
        Commands::Run(args) => {
            let mut config = args.predict.common.build_config()?;
            args.predict.apply_dropout(&mut config);
            let mut ctx = new_ctx("run", &args.predict.common, config)?;
            ctx.model = Some(load_model(&args.predict.model)?);
            let mut stages: Vec<Box<dyn Stage>> = vec![
                Box::new(Stage0Scaffold::new()),
                Box::new(Stage1Cohort::new()),
                Box::new(Stage2Inputs::new(true)),
                Box::new(Stage3Predict::new(args.force)),
                Box::new(Stage4Cluster::new()),
                Box::new(Stage5Metrics::new()),
                Box::new(Stage6Roc::new()),
            ];
            if args.saliency {
                stages.push(Box::new(Stage8Saliency::new()));
            }
            stages.push(Box::new(Stage9Output::new()));
            run(&mut ctx, stages)?;
            ctx
        }
    };

    print_summary(&ctx)
}

fn new_ctx(command: &str, common: &CommonArgs, config: EvalConfig) -> Result<Ctx> {
    let mut ctx = Ctx::new(
        command,
        config,
        common.mesh_dir.clone(),
        common.inputs.clone(),
        common.subject_ids()?,
    );
    ctx.threads = common.threads;
    Ok(ctx)
}

fn load_model(path: &Path) -> Result<Box<dyn fcd_lesion_eval::predict::LesionModel>> {
    Ok(Box::new(LinearLesionModel::load(path)?))
}

fn run(ctx: &mut Ctx, stages: Vec<Box<dyn Stage>>) -> Result<()> {
    Pipeline::new(stages).run(ctx)
}

fn print_summary(ctx: &Ctx) -> Result<()> {
    let summary = build_summary(ctx)?;
    print!("{}", format_summary(&summary));
    if !ctx.warnings.is_empty() {
        println!("warnings:");
        for warning in &ctx.warnings {
            println!("- {}", warning);
        }
    }
    Ok(())
}
