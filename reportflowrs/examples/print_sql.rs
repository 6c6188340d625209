use std::{env, fs, path::PathBuf};

use reportflow::dialect::DuckDbDialect;
use reportflow::query_builder::QueryBuilder;
use reportflow::registry::SchemaRegistry;
use reportflow::report::ReportSpec;
use reportflow::sql_ast::SqlRenderer;

fn usage() {
    eprintln!("Usage: print_sql <entities_dir> <report_json>");
    eprintln!("Example: cargo run --example print_sql -- demo/entities demo/reports/sales_by_region.json");
}

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }

    let entities_dir = PathBuf::from(args.remove(0));
    let report_path = PathBuf::from(args.remove(0));

    let registry = SchemaRegistry::load_from_dir(entities_dir)?;
    let spec: ReportSpec = serde_json::from_str(&fs::read_to_string(report_path)?)?;

    let compiled = QueryBuilder::default().compile(&registry, &spec)?;
    let sql = SqlRenderer::new(&DuckDbDialect).render_select(&compiled.query);
    println!("{sql}");
    Ok(())
}
