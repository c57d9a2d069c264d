mod domain;
mod import;
mod report;
mod scheduler;
mod selector;
mod session;
mod settings;
mod storage;
mod taxonomy;
mod tracker;
mod ui;
mod validation;

use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::import::import_report;
use crate::report::{render_report, ExportFormat};
use crate::session::SessionController;
use crate::settings::{resolve_state_dir, Settings};
use crate::storage::CacheFile;
use crate::taxonomy::{load_taxonomy, AreaNode};
use crate::ui::run_dashboard;

const LOG_FILTER_ENV: &str = "SESSION_COMPANION_LOG";
const LOG_FILE_NAME: &str = "session_companion.log";

#[derive(Debug, Parser)]
#[command(name = "session-companion", about = "Exploratory testing session recorder")]
struct Cli {
	#[arg(long)]
	state_dir: Option<PathBuf>,
	#[arg(long)]
	taxonomy: Option<PathBuf>,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	Dashboard,
	Status,
	Validate,
	Render {
		#[arg(long, value_enum, default_value_t = ExportFormat::PlainText)]
		format: ExportFormat,
	},
	Export {
		#[arg(long, value_enum)]
		format: Option<ExportFormat>,
	},
	Import {
		report: PathBuf,
		#[arg(long, value_enum, default_value_t = ExportFormat::PlainText)]
		format: ExportFormat,
	},
	Areas,
	Clear,
	Settings {
		#[arg(long)]
		export_path: Option<PathBuf>,
		#[arg(long, value_enum)]
		format: Option<ExportFormat>,
		#[arg(long)]
		taxonomy_path: Option<PathBuf>,
	},
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn run() -> Result<(), Box<dyn Error>> {
	let cli = Cli::parse();
	let state_dir = resolve_state_dir(cli.state_dir);
	let command = cli.command.unwrap_or(Command::Dashboard);

	let log_file = matches!(command, Command::Dashboard).then(|| state_dir.join(LOG_FILE_NAME));
	init_logging(log_file.as_deref());

	let mut settings = Settings::load_or_default(&state_dir);

	if let Command::Settings {
		export_path,
		format,
		taxonomy_path,
	} = command
	{
		return update_settings(&mut settings, &state_dir, export_path, format, taxonomy_path);
	}

	if let Command::Import { report, format } = &command {
		let raw = fs::read_to_string(report)?;
		let session = import_report(&raw)?;
		print!(
			"{}",
			render_report(&session, session.accumulated_duration, *format, Utc::now())
		);
		return Ok(());
	}

	let roots = load_taxonomy(&settings.taxonomy_candidates(&state_dir, cli.taxonomy.as_deref()));
	if let Command::Areas = command {
		print_areas(&roots);
		return Ok(());
	}

	let store = CacheFile::in_dir(&state_dir);
	info!(cache = %store.path().display(), "starting session");
	let mut controller = SessionController::launch(store, roots, Local::now());

	match command {
		Command::Dashboard => {
			run_dashboard(&mut controller, &mut settings, &state_dir)?;
		}
		Command::Status => {
			print_status(&mut controller);
		}
		Command::Validate => {
			let report = controller.run_validation();
			if !report.is_valid() {
				return Err(format!("session is not ready for export:\n{}", report.message()).into());
			}
			println!("session is ready for export");
		}
		Command::Render { format } => {
			print!("{}", controller.render(format, Utc::now()));
		}
		Command::Export { format } => {
			let format = format.unwrap_or(settings.export_format);
			let path = controller.export(format, &settings.export_dir(&state_dir), Utc::now())?;
			println!("report saved to {}", path.display());
		}
		Command::Clear => {
			controller.clear(Local::now());
			println!("session cleared");
		}
		Command::Settings { .. } | Command::Import { .. } | Command::Areas => {}
	}

	Ok(())
}

fn init_logging(log_file: Option<&Path>) {
	let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

	let Some(path) = log_file else {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(io::stderr)
			.try_init();
		return;
	};

	// The dashboard owns the terminal, so logs go to a file or nowhere.
	let file = path
		.parent()
		.map_or(Ok(()), fs::create_dir_all)
		.and_then(|()| OpenOptions::new().create(true).append(true).open(path));
	match file {
		Ok(file) => {
			let _ = tracing_subscriber::fmt()
				.with_env_filter(filter)
				.with_ansi(false)
				.with_writer(Mutex::new(file))
				.try_init();
		}
		Err(_) => {
			let _ = tracing_subscriber::fmt()
				.with_env_filter(filter)
				.with_writer(io::sink)
				.try_init();
		}
	}
}

fn update_settings(
	settings: &mut Settings,
	state_dir: &Path,
	export_path: Option<PathBuf>,
	format: Option<ExportFormat>,
	taxonomy_path: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
	let changed = export_path.is_some() || format.is_some() || taxonomy_path.is_some();
	if let Some(path) = export_path {
		settings.export_path = Some(path);
	}
	if let Some(format) = format {
		settings.export_format = format;
	}
	if let Some(path) = taxonomy_path {
		settings.taxonomy_path = Some(path);
	}
	if changed {
		settings.save(state_dir)?;
	}

	println!("state dir: {}", state_dir.display());
	println!("export dir: {}", settings.export_dir(state_dir).display());
	println!("export format: {}", settings.export_format.display_name());
	println!(
		"taxonomy: {}",
		settings
			.taxonomy_path
			.as_ref()
			.map(|path| path.display().to_string())
			.unwrap_or_else(|| "(default lookup)".to_string())
	);
	Ok(())
}

fn print_status(controller: &mut SessionController<CacheFile>) {
	let session = controller.session();
	let title = if session.title.is_empty() { "(untitled)" } else { session.title.as_str() };
	println!("title: {title}");
	println!("areas: {}", session.area_path());
	println!("started: {}", session.start_time_display);
	println!(
		"duration: {} ({})",
		controller.tracker().display(),
		controller.tracker().category()
	);
	println!(
		"files: {} | bugs: {} | issues: {}",
		session.attached_files.len(),
		session.bugs.len(),
		session.issues.len()
	);
	println!("cache: {}", controller.store().path().display());

	let report = controller.run_validation();
	if report.is_valid() {
		println!("ready to export");
	} else {
		println!("{} problem(s) before export:", report.violations.len());
		for violation in &report.violations {
			println!("  - {violation}");
		}
	}
}

fn print_areas(roots: &[AreaNode]) {
	fn print_node(node: &AreaNode, depth: usize) {
		println!("{}{}", "  ".repeat(depth), node.name);
		for child in &node.children {
			print_node(child, depth + 1);
		}
	}

	for root in roots {
		print_node(root, 0);
	}
}
