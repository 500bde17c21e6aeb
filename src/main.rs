//! Scaffold's command-line entry point.
//! Loads one template, binds variables from a file and the command line,
//! renders it and writes the result.

use scaffold::{
    cli::{get_args, Args},
    config::load_variables,
    error::{default_error_handler, Error, Result},
    logger::init_logger,
    serializer::SerializeOptions,
    template::Engine,
};

/// Main application entry point.
#[tokio::main]
async fn main() {
    let args = get_args();
    init_logger(args.verbose);

    if let Err(err) = run(args).await {
        default_error_handler(err);
    }
}

/// Main application logic execution.
///
/// # Flow
/// 1. Builds the engine with the requested output settings
/// 2. Loads and prepares the template
/// 3. Assigns variables from `--vars`, then from `--set`
/// 4. Renders and writes to the output file or stdout
async fn run(args: Args) -> Result<()> {
    let options: SerializeOptions = args.output_config().into();
    let engine = Engine::new().with_options(options);
    let template = engine.template(&args.template).await?;

    if let Some(path) = &args.vars {
        template.assign_all(load_variables(path)?);
    }
    template.assign_all(args.set.iter().map(|(key, value)| (key, value)));

    let output = template.render().await?;
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(Error::IoError)?;
            }
            tokio::fs::write(path, output).await.map_err(Error::IoError)?;
            log::debug!("Wrote {}", path.display());
        }
        None => println!("{}", output),
    }
    Ok(())
}
