use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use node_forge_shader_graph::{CompilerOptions, ShaderCompiler, dsl, logging};
use tracing::info;

#[derive(Debug, Default, Clone)]
struct Cli {
    dsl_json: Option<PathBuf>,
    options_json: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    validate: bool,
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dsl-json" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --dsl-json"));
                };
                cli.dsl_json = Some(PathBuf::from(v));
                i += 2;
            }
            "--options" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --options"));
                };
                cli.options_json = Some(PathBuf::from(v));
                i += 2;
            }
            "--outputdir" | "--output-dir" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --outputdir"));
                };
                cli.output_dir = Some(PathBuf::from(v));
                i += 2;
            }
            "--validate" => {
                cli.validate = true;
                i += 1;
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other} (supported: --dsl-json <graph.json>, --options <options.json>, --outputdir <dir>, --validate)"
                ));
            }
        }
    }
    Ok(cli)
}

fn load_options(path: Option<&Path>) -> Result<CompilerOptions> {
    let Some(path) = path else {
        return Ok(CompilerOptions::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read --options file {}", path.display()))?;
    CompilerOptions::from_json_str(&text)
}

fn output_path(output_dir: &Path, dsl_json_path: &Path) -> PathBuf {
    let stem = dsl_json_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "graph".to_string());
    output_dir.join(format!("{stem}.wgsl"))
}

fn run(cli: &Cli) -> Result<()> {
    let dsl_json_path = cli
        .dsl_json
        .as_deref()
        .ok_or_else(|| anyhow!("--dsl-json <graph.json> is required"))?;
    let text = std::fs::read_to_string(dsl_json_path)
        .with_context(|| format!("failed to read --dsl-json file {}", dsl_json_path.display()))?;

    let mut options = load_options(cli.options_json.as_deref())?;
    if cli.validate {
        options.validate_output = true;
    }

    let (graph, roots) = dsl::graph_from_json(&text)?;
    let mut compiler = ShaderCompiler::new(options);
    let bundle = compiler
        .compile_bundle(&graph, &roots)
        .map_err(|e| anyhow!("failed to compile {}: {e}", dsl_json_path.display()))?;

    match cli.output_dir.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let out_path = output_path(dir, dsl_json_path);
            std::fs::write(&out_path, &bundle.module)
                .with_context(|| format!("failed to write {}", out_path.display()))?;
            info!(path = %out_path.display(), uniforms = bundle.uniforms.len(), "wrote shader module");
        }
        None => print!("{}", bundle.module),
    }
    Ok(())
}

fn main() -> Result<()> {
    logging::init_logging();
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;
    run(&cli)
}
