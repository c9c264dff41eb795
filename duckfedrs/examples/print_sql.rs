use std::{env, path::PathBuf};

use duckfed::{
    casts::ResolvedCasts, metadata::parse_column_metadata, DuckfedConfig, SqlCompiler,
    VisualQueryConfig,
};

fn usage() {
    eprintln!("Usage: print_sql <table> <query_config.{{json,yaml}}> [columns.json]");
    eprintln!("Example: cargo run --example print_sql -- orders demos/orders_by_country.yaml");
}

fn main() -> anyhow::Result<()> {
    duckfed::init_tracing();
    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }

    let table = args.remove(0);
    let config_path = PathBuf::from(args.remove(0));
    let profiles = match args.first() {
        Some(path) => parse_column_metadata(&std::fs::read_to_string(path)?)?,
        None => Vec::new(),
    };

    let settings = DuckfedConfig::load_default();
    let config = VisualQueryConfig::from_file(&config_path)?;
    let output = SqlCompiler::with_options(settings.compiler).compile(
        &config,
        &table,
        &profiles,
        &ResolvedCasts::new(),
    );

    for warning in &output.warnings {
        eprintln!("warning: {warning}");
    }
    if !output.success {
        for error in &output.errors {
            eprintln!("error: {error}");
        }
        std::process::exit(2);
    }
    println!("{}", output.sql);
    Ok(())
}
