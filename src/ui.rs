use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::{Local, Utc};
use crossterm::event::{self, DisableFocusChange, EnableFocusChange, Event as CEvent, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use tracing::{info, warn};

use crate::domain::{percent_sum_in_band, BugField, DurationCategory, IssueField, TaskCategory};
use crate::import::import_report;
use crate::report::ExportFormat;
use crate::session::{ExportError, SessionController};
use crate::settings::Settings;
use crate::storage::SessionStore;

const FOCUSED_PANEL_BORDER_COLOR: Color = Color::Yellow;
const INACTIVE_PANEL_BORDER_COLOR: Color = Color::DarkGray;
const HIGHLIGHT_BACKGROUND_COLOR: Color = Color::Rgb(42, 45, 52);
const READ_ONLY_HINT: &str = "Report is read-only. Press E to enable editing";

pub fn run_dashboard<S: SessionStore>(
	controller: &mut SessionController<S>,
	settings: &mut Settings,
	state_dir: &Path,
) -> Result<(), Box<dyn Error>> {
	enable_raw_mode()?;
	let mut stdout = io::stdout();
	execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
	let backend = CrosstermBackend::new(stdout);
	let mut terminal = Terminal::new(backend)?;

	let result = run_event_loop(&mut terminal, controller, settings, state_dir);
	controller.shutdown(Utc::now());

	disable_raw_mode()?;
	execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
	terminal.show_cursor()?;

	result
}

fn run_event_loop<S: SessionStore>(
	terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
	controller: &mut SessionController<S>,
	settings: &mut Settings,
	state_dir: &Path,
) -> Result<(), Box<dyn Error>> {
	let mut app = App::default();
	if !controller.status().is_empty() {
		app.status = controller.status().to_string();
	}

	loop {
		controller.poll(Utc::now());
		app.clamp_selection(controller);
		terminal.draw(|frame| draw_dashboard(frame, &app, &*controller))?;

		if !event::poll(StdDuration::from_millis(250))? {
			continue;
		}

		match event::read()? {
			CEvent::Key(key) if key.kind == KeyEventKind::Press => {
				let should_quit = match &app.mode {
					InputMode::Prompt(_) => handle_prompt_key(&mut app, key.code, controller, settings, state_dir),
					InputMode::Select(_) => handle_select_key(&mut app, key.code, controller, settings, state_dir),
					InputMode::Normal => handle_normal_key(&mut app, key.code, controller, settings),
				};

				if should_quit {
					break;
				}
			}
			CEvent::FocusGained => controller.focus_gained(Utc::now()),
			CEvent::FocusLost => controller.focus_lost(Utc::now()),
			_ => {}
		}
	}

	Ok(())
}

fn draw_dashboard<S: SessionStore>(frame: &mut Frame, app: &App, controller: &SessionController<S>) {
	let violations = controller.validation().violations.len() as u16;
	let layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Length(7),
			Constraint::Min(10),
			Constraint::Length(if violations == 0 { 0 } else { violations + 2 }),
			Constraint::Length(5),
		])
		.split(frame.area());

	let header = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
		.split(layout[0]);

	let body = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage(30),
			Constraint::Percentage(35),
			Constraint::Percentage(35),
		])
		.split(layout[1]);

	let middle = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
		.split(body[1]);

	let right = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
		.split(body[2]);

	render_session_panel(frame, header[0], controller);
	render_breakdown_panel(frame, header[1], controller);
	render_areas_panel(frame, body[0], app, controller);
	render_files_panel(frame, middle[0], app, controller);
	render_notes_panel(frame, middle[1], controller);
	render_bugs_panel(frame, right[0], app, controller);
	render_issues_panel(frame, right[1], app, controller);
	if violations > 0 {
		render_validation_panel(frame, layout[2], controller);
	}
	render_footer(frame, layout[3], app);

	if let InputMode::Select(select) = &app.mode {
		render_select_popup(frame, select);
	}
}

fn render_session_panel<S: SessionStore>(frame: &mut Frame, area: Rect, controller: &SessionController<S>) {
	let session = controller.session();
	let tracker = controller.tracker();
	let category_style = match tracker.category() {
		DurationCategory::Small => Style::default().fg(Color::Green),
		DurationCategory::Medium => Style::default().fg(Color::Yellow),
		DurationCategory::Long => Style::default().fg(Color::Red),
	};

	let mode = match controller.opened_report() {
		Some(path) if controller.is_read_only() => Span::styled(
			format!("Read-only: {}", path.display()),
			Style::default().fg(Color::LightRed).add_modifier(Modifier::BOLD),
		),
		_ => Span::styled("Editing", Style::default().fg(Color::Green)),
	};

	let lines = vec![
		Line::from(format!("Title: {}", placeholder(&session.title))),
		Line::from(format!("Testers: {}", placeholder(&session.tester_names))),
		Line::from(format!("Start: {}", session.start_time_display)),
		Line::from(vec![
			Span::raw(format!("Duration: {} ", tracker.display())),
			Span::styled(format!("({})", tracker.category()), category_style),
		]),
		Line::from(mode),
	];

	let panel = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Session"));
	frame.render_widget(panel, area);
}

fn render_breakdown_panel<S: SessionStore>(frame: &mut Frame, area: Rect, controller: &SessionController<S>) {
	let session = controller.session();
	let mut lines = TaskCategory::ALL
		.iter()
		.enumerate()
		.map(|(index, category)| {
			Line::from(format!(
				"[{}] {}: {:.1}%",
				index + 1,
				category.label(),
				session.task_percent(*category)
			))
		})
		.collect::<Vec<_>>();

	let sum = session.task_breakdown_sum();
	if percent_sum_in_band(sum) {
		lines.push(Line::from(Span::styled(
			format!("Sum: {sum:.1}%"),
			Style::default().fg(Color::Green),
		)));
	} else {
		lines.push(Line::from(Span::styled(
			session.task_breakdown_error(),
			Style::default().fg(Color::Red),
		)));
	}
	lines.push(Line::from(format!(
		"Charter: {:.1}% | Opportunity: {:.1}%",
		session.charter_percent, session.opportunity_percent
	)));

	let panel = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Task Breakdown"));
	frame.render_widget(panel, area);
}

fn render_areas_panel<S: SessionStore>(frame: &mut Frame, area: Rect, app: &App, controller: &SessionController<S>) {
	let items = controller
		.selector()
		.levels()
		.iter()
		.enumerate()
		.map(|(index, level)| {
			let label = level
				.selected_node()
				.map(|node| node.name.clone())
				.unwrap_or_else(|| "(choose)".to_string());
			ListItem::new(format!("Level {}: {label}", index + 1))
		})
		.collect::<Vec<_>>();

	let path = controller.session().area_path();
	let title = if path.is_empty() {
		"Areas".to_string()
	} else {
		format!("Areas: {path}")
	};
	render_list(frame, area, title, items, app.area_index, app.focus == FocusPane::Areas, "(no areas)");
}

fn render_files_panel<S: SessionStore>(frame: &mut Frame, area: Rect, app: &App, controller: &SessionController<S>) {
	let items = controller
		.session()
		.attached_files
		.iter()
		.map(|path| ListItem::new(path.clone()))
		.collect::<Vec<_>>();
	render_list(
		frame,
		area,
		"Attached Files".to_string(),
		items,
		app.file_index,
		app.focus == FocusPane::Files,
		"(no files attached)",
	);
}

fn render_notes_panel<S: SessionStore>(frame: &mut Frame, area: Rect, controller: &SessionController<S>) {
	let notes = controller.session().test_notes.as_str();
	let panel = Paragraph::new(if notes.is_empty() { "(no notes)" } else { notes })
		.wrap(Wrap { trim: false })
		.block(Block::default().borders(Borders::ALL).title("Test Notes"));
	frame.render_widget(panel, area);
}

fn render_bugs_panel<S: SessionStore>(frame: &mut Frame, area: Rect, app: &App, controller: &SessionController<S>) {
	let items = controller
		.session()
		.bugs
		.iter()
		.enumerate()
		.map(|(index, bug)| {
			let mut lines = vec![Line::from(format!("#{} {}", index + 1, placeholder(&bug.title)))];
			if !bug.related_files.is_empty() {
				lines.push(Line::from(Span::styled(
					format!("   {} related file(s)", bug.related_files.len()),
					Style::default().fg(Color::DarkGray),
				)));
			}
			ListItem::new(lines)
		})
		.collect::<Vec<_>>();
	render_list(
		frame,
		area,
		"Bugs".to_string(),
		items,
		app.bug_index,
		app.focus == FocusPane::Bugs,
		"(no bugs)",
	);
}

fn render_issues_panel<S: SessionStore>(frame: &mut Frame, area: Rect, app: &App, controller: &SessionController<S>) {
	let items = controller
		.session()
		.issues
		.iter()
		.enumerate()
		.map(|(index, issue)| ListItem::new(format!("#{} {}", index + 1, placeholder(&issue.title))))
		.collect::<Vec<_>>();
	render_list(
		frame,
		area,
		"Issues".to_string(),
		items,
		app.issue_index,
		app.focus == FocusPane::Issues,
		"(no issues)",
	);
}

fn render_validation_panel<S: SessionStore>(frame: &mut Frame, area: Rect, controller: &SessionController<S>) {
	let lines = controller
		.validation()
		.violations
		.iter()
		.map(|violation| Line::from(Span::styled(violation.clone(), Style::default().fg(Color::Red))))
		.collect::<Vec<_>>();
	let panel = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Validation"));
	frame.render_widget(panel, area);
}

fn render_list(
	frame: &mut Frame,
	area: Rect,
	title: String,
	items: Vec<ListItem<'static>>,
	selected: usize,
	focused: bool,
	empty_text: &'static str,
) {
	let mut state = ListState::default();
	if !items.is_empty() {
		state.select(Some(selected.min(items.len() - 1)));
	}

	let list = List::new(if items.is_empty() {
		vec![ListItem::new(empty_text)]
	} else {
		items
	})
	.block(
		Block::default()
			.borders(Borders::ALL)
			.title(title)
			.border_style(border_style(focused)),
	)
	.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR).add_modifier(Modifier::BOLD));

	frame.render_stateful_widget(list, area, &mut state);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
	let footer_lines = match &app.mode {
		InputMode::Normal => vec![
			Line::from(
				"Tab pane | j/k move | Enter choose area | t title | w testers | n/N note | 1-3 breakdown | c/o charter/opportunity",
			),
			Line::from(
				"a attach | b bug | i issue | e edit | r related file | x remove | v validate | s export | O open | E edit mode | C clear | P export dir | q quit",
			),
			Line::from(app.status.clone()),
		],
		InputMode::Prompt(prompt) => vec![
			Line::from(prompt.title.clone()),
			Line::from(format!("> {}", prompt.input)),
			Line::from("Enter submit | Esc cancel"),
		],
		InputMode::Select(select) => vec![
			Line::from(select.title.clone()),
			Line::from(format!(
				"Selected: {}",
				select
					.selected_option()
					.map(|option| option.label.as_str())
					.unwrap_or("(none)")
			)),
			Line::from("j/k or arrows move | Enter choose | Esc cancel"),
		],
	};

	let footer = Paragraph::new(footer_lines).block(Block::default().borders(Borders::ALL).title("Shortcuts"));
	frame.render_widget(footer, area);
}

fn render_select_popup(frame: &mut Frame, select: &SelectState) {
	let area = centered_rect(62, 55, frame.area());
	frame.render_widget(Clear, area);

	let items = if select.options.is_empty() {
		vec![ListItem::new("(no choices)")]
	} else {
		select
			.options
			.iter()
			.map(|option| ListItem::new(option.label.clone()).style(option.style))
			.collect::<Vec<_>>()
	};

	let current = if select.options.is_empty() {
		0
	} else {
		select.selected.saturating_add(1)
	};
	let total = select.options.len();
	let list = List::new(items)
		.block(
			Block::default()
				.borders(Borders::ALL)
				.title(format!("{} ({current}/{total})", select.title)),
		)
		.highlight_symbol(">> ")
		.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR));

	let mut state = ListState::default();
	if !select.options.is_empty() {
		state.select(Some(select.selected.min(select.options.len().saturating_sub(1))));
	}
	frame.render_stateful_widget(list, area, &mut state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
	let popup_layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Percentage((100 - percent_y) / 2),
			Constraint::Percentage(percent_y),
			Constraint::Percentage((100 - percent_y) / 2),
		])
		.split(area);
	Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage((100 - percent_x) / 2),
			Constraint::Percentage(percent_x),
			Constraint::Percentage((100 - percent_x) / 2),
		])
		.split(popup_layout[1])[1]
}

fn handle_normal_key<S: SessionStore>(
	app: &mut App,
	code: KeyCode,
	controller: &mut SessionController<S>,
	settings: &Settings,
) -> bool {
	let session = controller.session();
	match code {
		KeyCode::Char('q') | KeyCode::Esc => true,
		KeyCode::Tab => {
			app.focus = app.focus.next();
			false
		}
		KeyCode::BackTab => {
			app.focus = app.focus.prev();
			false
		}
		KeyCode::Up | KeyCode::Char('k') => {
			app.move_selection(-1, controller);
			false
		}
		KeyCode::Down | KeyCode::Char('j') => {
			app.move_selection(1, controller);
			false
		}
		KeyCode::Enter => {
			if app.focus == FocusPane::Areas {
				let select = build_area_select(controller, app.area_index);
				app.begin_edit(controller, InputMode::Select(select));
			}
			false
		}
		KeyCode::Char('t') => {
			let prompt = PromptState::with_input("Session title", PromptKind::Title, &session.title);
			app.begin_edit(controller, InputMode::Prompt(prompt));
			false
		}
		KeyCode::Char('w') => {
			let prompt = PromptState::with_input("Tester name(s)", PromptKind::Testers, &session.tester_names);
			app.begin_edit(controller, InputMode::Prompt(prompt));
			false
		}
		KeyCode::Char('n') => {
			app.begin_edit(controller, InputMode::Prompt(PromptState::new("Append note line", PromptKind::AppendNote)));
			false
		}
		KeyCode::Char('N') => {
			let prompt = PromptState::new("Replace all notes (blank clears)", PromptKind::ReplaceNotes);
			app.begin_edit(controller, InputMode::Prompt(prompt));
			false
		}
		KeyCode::Char(digit @ '1'..='3') => {
			let index = digit as usize - '1' as usize;
			let category = TaskCategory::ALL[index];
			let prompt = PromptState::with_input(
				format!("{} percent (0-100)", category.label()),
				PromptKind::TaskPercent { category },
				&format_percent_input(session.task_percent(category)),
			);
			app.begin_edit(controller, InputMode::Prompt(prompt));
			false
		}
		KeyCode::Char('c') => {
			let prompt = PromptState::with_input(
				"Charter percent (opportunity follows)",
				PromptKind::Charter,
				&format_percent_input(session.charter_percent),
			);
			app.begin_edit(controller, InputMode::Prompt(prompt));
			false
		}
		KeyCode::Char('o') => {
			let prompt = PromptState::with_input(
				"Opportunity percent (charter follows)",
				PromptKind::Opportunity,
				&format_percent_input(session.opportunity_percent),
			);
			app.begin_edit(controller, InputMode::Prompt(prompt));
			false
		}
		KeyCode::Char('a') => {
			let prompt = PromptState::new("File path(s), separated by ';'", PromptKind::AttachFiles);
			app.begin_edit(controller, InputMode::Prompt(prompt));
			false
		}
		KeyCode::Char('b') => {
			if controller.is_read_only() {
				app.status = READ_ONLY_HINT.to_string();
				return false;
			}
			match controller.add_bug(Utc::now()) {
				Ok(index) => {
					app.focus = FocusPane::Bugs;
					app.bug_index = index;
					app.mode = InputMode::Prompt(bug_field_prompt(controller, index, BugField::Title, true));
				}
				Err(err) => app.status = format!("error: {err}"),
			}
			false
		}
		KeyCode::Char('i') => {
			if controller.is_read_only() {
				app.status = READ_ONLY_HINT.to_string();
				return false;
			}
			match controller.add_issue(Utc::now()) {
				Ok(index) => {
					app.focus = FocusPane::Issues;
					app.issue_index = index;
					app.mode = InputMode::Prompt(issue_field_prompt(controller, index, IssueField::Title, true));
				}
				Err(err) => app.status = format!("error: {err}"),
			}
			false
		}
		KeyCode::Char('e') => {
			match app.focus {
				FocusPane::Bugs if app.bug_index < session.bugs.len() => {
					let select = build_bug_field_select(app.bug_index);
					app.begin_edit(controller, InputMode::Select(select));
				}
				FocusPane::Issues if app.issue_index < session.issues.len() => {
					let select = build_issue_field_select(app.issue_index);
					app.begin_edit(controller, InputMode::Select(select));
				}
				_ => app.status = "Select a bug or issue to edit".to_string(),
			}
			false
		}
		KeyCode::Char('r') => {
			if app.focus != FocusPane::Bugs || app.bug_index >= session.bugs.len() {
				app.status = "Select a bug in the Bugs pane first".to_string();
			} else if session.attached_files.is_empty() {
				app.status = "Attach files before linking them to a bug".to_string();
			} else {
				let select = build_related_file_select(controller, app.bug_index);
				app.begin_edit(controller, InputMode::Select(select));
			}
			false
		}
		KeyCode::Char('x') => {
			remove_selected(app, controller);
			false
		}
		KeyCode::Char('v') => {
			let report = controller.run_validation();
			app.status = if report.is_valid() {
				"Session is ready to export".to_string()
			} else {
				format!("{} problem(s) found", report.violations.len())
			};
			false
		}
		KeyCode::Char('s') => {
			app.mode = InputMode::Select(build_export_format_select(settings.export_format));
			false
		}
		KeyCode::Char('O') => {
			app.mode = InputMode::Prompt(PromptState::new("Path of a JSON report to open", PromptKind::OpenReport));
			false
		}
		KeyCode::Char('E') => {
			if controller.is_read_only() {
				controller.enable_editing(Utc::now());
				app.status = controller.status().to_string();
			} else {
				app.status = "Already editing".to_string();
			}
			false
		}
		KeyCode::Char('C') => {
			app.mode = InputMode::Select(build_clear_confirm_select());
			false
		}
		KeyCode::Char('P') => {
			let current = settings
				.export_path
				.as_ref()
				.map(|path| path.display().to_string())
				.unwrap_or_default();
			app.mode = InputMode::Prompt(PromptState::with_input(
				"Export directory (blank for default)",
				PromptKind::ExportPath,
				&current,
			));
			false
		}
		_ => false,
	}
}

fn remove_selected<S: SessionStore>(app: &mut App, controller: &mut SessionController<S>) {
	let now = Utc::now();
	let session = controller.session();
	let result = match app.focus {
		FocusPane::Files => match session.attached_files.get(app.file_index).cloned() {
			Some(path) => controller
				.remove_file(&path, now)
				.map(|_| format!("Removed file: {path}")),
			None => Ok("No file selected".to_string()),
		},
		FocusPane::Bugs if app.bug_index < session.bugs.len() => controller
			.remove_bug(app.bug_index, now)
			.map(|()| format!("Removed bug #{}", app.bug_index + 1)),
		FocusPane::Issues if app.issue_index < session.issues.len() => controller
			.remove_issue(app.issue_index, now)
			.map(|()| format!("Removed issue #{}", app.issue_index + 1)),
		_ => Ok("Nothing selected to remove".to_string()),
	};

	app.status = match result {
		Ok(message) => message,
		Err(err) => format!("error: {err}"),
	};
}

fn handle_prompt_key<S: SessionStore>(
	app: &mut App,
	code: KeyCode,
	controller: &mut SessionController<S>,
	settings: &mut Settings,
	state_dir: &Path,
) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Input cancelled".to_string();
		}
		KeyCode::Backspace => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.pop();
			}
		}
		KeyCode::Char(value) => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.push(value);
			}
		}
		KeyCode::Enter => {
			let prompt = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Prompt(prompt) => prompt,
				InputMode::Normal | InputMode::Select(_) => return false,
			};

			match submit_prompt(prompt.clone(), controller, settings, state_dir) {
				Ok(PromptOutcome::NextPrompt(next_prompt)) => app.mode = InputMode::Prompt(next_prompt),
				Ok(PromptOutcome::Done(message)) => {
					app.mode = InputMode::Normal;
					app.status = message;
				}
				Err(err) => {
					app.mode = InputMode::Prompt(prompt);
					app.status = format!("error: {err}");
				}
			}
		}
		_ => {}
	}

	false
}

fn handle_select_key<S: SessionStore>(
	app: &mut App,
	code: KeyCode,
	controller: &mut SessionController<S>,
	settings: &Settings,
	state_dir: &Path,
) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Selection cancelled".to_string();
		}
		KeyCode::Up | KeyCode::Char('k') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(-1);
			}
		}
		KeyCode::Down | KeyCode::Char('j') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(1);
			}
		}
		KeyCode::Enter => {
			let select = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Select(select) => select,
				_ => return false,
			};

			match submit_select(select.clone(), controller, settings, state_dir) {
				Ok(SelectOutcome::NextPrompt(prompt)) => app.mode = InputMode::Prompt(prompt),
				Ok(SelectOutcome::NextSelect(next_select)) => app.mode = InputMode::Select(next_select),
				Ok(SelectOutcome::Done(message)) => {
					app.mode = InputMode::Normal;
					app.status = message;
				}
				Err(err) => {
					app.mode = InputMode::Select(select);
					app.status = format!("error: {err}");
				}
			}
		}
		_ => {}
	}

	false
}

fn submit_prompt<S: SessionStore>(
	prompt: PromptState,
	controller: &mut SessionController<S>,
	settings: &mut Settings,
	state_dir: &Path,
) -> Result<PromptOutcome, String> {
	let now = Utc::now();
	let input = prompt.input.trim().to_string();
	match prompt.kind {
		PromptKind::Title => {
			controller.set_title(input, now).map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done("Title updated".to_string()))
		}
		PromptKind::Testers => {
			controller.set_tester_names(input, now).map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done("Testers updated".to_string()))
		}
		PromptKind::AppendNote => {
			let line = required_text(&prompt.input, "note")?;
			controller.append_note_line(&line, now).map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done("Note added".to_string()))
		}
		PromptKind::ReplaceNotes => {
			controller.set_test_notes(input, now).map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done("Notes replaced".to_string()))
		}
		PromptKind::TaskPercent { category } => {
			let value = parse_percent(&input)?;
			controller
				.set_task_percent(category, value, now)
				.map_err(|err| err.to_string())?;
			let session = controller.session();
			let message = if percent_sum_in_band(session.task_breakdown_sum()) {
				format!("{} set", category.label())
			} else {
				session.task_breakdown_error()
			};
			Ok(PromptOutcome::Done(message))
		}
		PromptKind::Charter => {
			let value = parse_percent(&input)?;
			controller.set_charter(value, now).map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done(charter_message(controller)))
		}
		PromptKind::Opportunity => {
			let value = parse_percent(&input)?;
			controller.set_opportunity(value, now).map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done(charter_message(controller)))
		}
		PromptKind::AttachFiles => {
			let paths = split_paths(&input);
			if paths.is_empty() {
				return Err("file path is required".to_string());
			}
			let added = controller.attach_files(paths, now).map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done(format!("Attached {added} file(s)")))
		}
		PromptKind::BugField { index, field, chained } => {
			controller
				.set_bug_field(index, field, input, now)
				.map_err(|err| err.to_string())?;
			let next = BugField::ALL
				.iter()
				.skip_while(|candidate| **candidate != field)
				.nth(1)
				.copied();
			match next {
				Some(next) if chained => Ok(PromptOutcome::NextPrompt(bug_field_prompt(controller, index, next, true))),
				_ => Ok(PromptOutcome::Done(format!("Bug #{} saved", index + 1))),
			}
		}
		PromptKind::IssueField { index, field, chained } => {
			controller
				.set_issue_field(index, field, input, now)
				.map_err(|err| err.to_string())?;
			let next = IssueField::ALL
				.iter()
				.skip_while(|candidate| **candidate != field)
				.nth(1)
				.copied();
			match next {
				Some(next) if chained => {
					Ok(PromptOutcome::NextPrompt(issue_field_prompt(controller, index, next, true)))
				}
				_ => Ok(PromptOutcome::Done(format!("Issue #{} saved", index + 1))),
			}
		}
		PromptKind::OpenReport => {
			let path = absolute_path(&required_text(&prompt.input, "report path")?);
			let raw = fs::read_to_string(&path).map_err(|err| format!("could not read {}: {err}", path.display()))?;
			let session = import_report(&raw).map_err(|err| {
				warn!(path = %path.display(), error = %err, "could not parse report");
				format!("could not parse report: {err}")
			})?;
			controller.open_report(session, &path, now);
			Ok(PromptOutcome::Done(controller.status().to_string()))
		}
		PromptKind::ExportPath => {
			settings.export_path = optional_text(&prompt.input).map(|path| absolute_path(&path));
			settings.save(state_dir).map_err(|err| err.to_string())?;
			info!(export_dir = %settings.export_dir(state_dir).display(), "export directory updated");
			Ok(PromptOutcome::Done(format!(
				"Reports will be saved to: {}",
				settings.export_dir(state_dir).display()
			)))
		}
	}
}

fn submit_select<S: SessionStore>(
	select: SelectState,
	controller: &mut SessionController<S>,
	settings: &Settings,
	state_dir: &Path,
) -> Result<SelectOutcome, String> {
	let now = Utc::now();
	let selected_value = select
		.selected_option()
		.map(|option| option.value.clone())
		.ok_or_else(|| "no option selected".to_string())?;

	match select.kind {
		SelectKind::AreaOption { level } => {
			controller
				.select_area(level, select.selected, now)
				.map_err(|err| err.to_string())?;
			Ok(SelectOutcome::Done(format!("Area: {}", controller.session().area_path())))
		}
		SelectKind::BugFieldToEdit { index } => {
			let field = BugField::ALL
				.get(select.selected)
				.copied()
				.ok_or_else(|| "selected field is missing".to_string())?;
			Ok(SelectOutcome::NextPrompt(bug_field_prompt(controller, index, field, false)))
		}
		SelectKind::IssueFieldToEdit { index } => {
			let field = IssueField::ALL
				.get(select.selected)
				.copied()
				.ok_or_else(|| "selected field is missing".to_string())?;
			Ok(SelectOutcome::NextPrompt(issue_field_prompt(controller, index, field, false)))
		}
		SelectKind::RelatedFile { index } => {
			let path = selected_value.ok_or_else(|| "selected file is missing".to_string())?;
			let linked = controller
				.toggle_bug_file(index, &path, now)
				.map_err(|err| err.to_string())?;
			let verb = if linked { "Linked" } else { "Unlinked" };
			let mut next = build_related_file_select(controller, index);
			next.selected = select.selected;
			next.title = format!("{} | {verb} {path}", next.title);
			Ok(SelectOutcome::NextSelect(next))
		}
		SelectKind::ExportFormat => {
			let format = ExportFormat::ALL
				.get(select.selected)
				.copied()
				.ok_or_else(|| "selected format is missing".to_string())?;
			let dir = settings.export_dir(state_dir);
			match controller.export(format, &dir, now) {
				Ok(_) | Err(ExportError::Io(_)) => Ok(SelectOutcome::Done(controller.status().to_string())),
				Err(ExportError::Invalid(report)) => Ok(SelectOutcome::Done(format!(
					"Cannot export: {} problem(s), see Validation",
					report.violations.len()
				))),
			}
		}
		SelectKind::ClearConfirm => {
			if selected_value.as_deref() == Some("clear") {
				controller.clear(Local::now());
				Ok(SelectOutcome::Done(controller.status().to_string()))
			} else {
				Ok(SelectOutcome::Done("Clear cancelled".to_string()))
			}
		}
	}
}

fn build_area_select<S: SessionStore>(controller: &SessionController<S>, level: usize) -> SelectState {
	let (options, selected) = controller
		.selector()
		.levels()
		.get(level)
		.map(|entry| {
			let options = entry
				.options
				.iter()
				.map(|node| {
					let label = if node.has_children() {
						format!("{} >", node.name)
					} else {
						node.name.clone()
					};
					SelectOption::new(label, Some(node.name.clone()), Style::default())
				})
				.collect::<Vec<_>>();
			(options, entry.selected.unwrap_or(0))
		})
		.unwrap_or_default();

	SelectState {
		selected,
		..SelectState::new(format!("Area level {}", level + 1), SelectKind::AreaOption { level }, options)
	}
}

fn build_bug_field_select(index: usize) -> SelectState {
	let options = BugField::ALL
		.iter()
		.map(|field| SelectOption::new(field.label(), None, Style::default()))
		.collect();
	SelectState::new(format!("Edit bug #{}", index + 1), SelectKind::BugFieldToEdit { index }, options)
}

fn build_issue_field_select(index: usize) -> SelectState {
	let options = IssueField::ALL
		.iter()
		.map(|field| SelectOption::new(field.label(), None, Style::default()))
		.collect();
	SelectState::new(format!("Edit issue #{}", index + 1), SelectKind::IssueFieldToEdit { index }, options)
}

fn build_related_file_select<S: SessionStore>(controller: &SessionController<S>, index: usize) -> SelectState {
	let session = controller.session();
	let related = session
		.bugs
		.get(index)
		.map(|bug| bug.related_files.as_slice())
		.unwrap_or_default();
	let options = session
		.attached_files
		.iter()
		.map(|path| {
			let linked = related.contains(path);
			let style = if linked {
				Style::default().fg(Color::LightGreen)
			} else {
				Style::default()
			};
			SelectOption::new(
				format!("[{}] {path}", if linked { 'x' } else { ' ' }),
				Some(path.clone()),
				style,
			)
		})
		.collect();
	SelectState::new(
		format!("Related files for bug #{} (Esc when done)", index + 1),
		SelectKind::RelatedFile { index },
		options,
	)
}

fn build_export_format_select(default_format: ExportFormat) -> SelectState {
	let options = ExportFormat::ALL
		.iter()
		.map(|format| SelectOption::new(format.display_name(), None, Style::default()))
		.collect();
	SelectState {
		selected: ExportFormat::ALL
			.iter()
			.position(|format| *format == default_format)
			.unwrap_or(0),
		..SelectState::new("Export format", SelectKind::ExportFormat, options)
	}
}

fn build_clear_confirm_select() -> SelectState {
	SelectState::new(
		"Clear session? Unsaved work is lost",
		SelectKind::ClearConfirm,
		vec![
			SelectOption::new("Keep session", Some("keep".to_string()), Style::default()),
			SelectOption::new(
				"Clear session",
				Some("clear".to_string()),
				Style::default().fg(Color::LightRed),
			),
		],
	)
}

fn bug_field_prompt<S: SessionStore>(
	controller: &SessionController<S>,
	index: usize,
	field: BugField,
	chained: bool,
) -> PromptState {
	let current = controller
		.session()
		.bugs
		.get(index)
		.map(|bug| bug.field(field).to_string())
		.unwrap_or_default();
	PromptState::with_input(
		format!("Bug #{} {}", index + 1, field.label()),
		PromptKind::BugField { index, field, chained },
		&current,
	)
}

fn issue_field_prompt<S: SessionStore>(
	controller: &SessionController<S>,
	index: usize,
	field: IssueField,
	chained: bool,
) -> PromptState {
	let current = controller
		.session()
		.issues
		.get(index)
		.map(|issue| issue.field(field).to_string())
		.unwrap_or_default();
	PromptState::with_input(
		format!("Issue #{} {}", index + 1, field.label()),
		PromptKind::IssueField { index, field, chained },
		&current,
	)
}

fn charter_message<S: SessionStore>(controller: &SessionController<S>) -> String {
	let session = controller.session();
	format!(
		"Charter {:.1}% | Opportunity {:.1}%",
		session.charter_percent, session.opportunity_percent
	)
}

fn parse_percent(input: &str) -> Result<f64, String> {
	match input.trim().trim_end_matches('%').trim().parse::<f64>() {
		Ok(value) if value.is_finite() => Ok(value),
		_ => Err(format!("'{input}' is not a number between 0 and 100")),
	}
}

fn format_percent_input(value: f64) -> String {
	if value == 0.0 {
		String::new()
	} else {
		format!("{value}")
	}
}

fn split_paths(input: &str) -> Vec<String> {
	input
		.split(';')
		.map(str::trim)
		.filter(|path| !path.is_empty())
		.map(|path| absolute_path(path).display().to_string())
		.collect()
}

fn absolute_path(raw: &str) -> PathBuf {
	let path = PathBuf::from(raw.trim());
	if path.is_absolute() {
		return path;
	}
	std::env::current_dir()
		.map(|cwd| cwd.join(&path))
		.unwrap_or(path)
}

fn placeholder(value: &str) -> &str {
	if value.trim().is_empty() { "(empty)" } else { value }
}

fn required_text(input: &str, field_name: &str) -> Result<String, String> {
	let value = input.trim();
	if value.is_empty() {
		Err(format!("{field_name} is required"))
	} else {
		Ok(value.to_string())
	}
}

fn optional_text(input: &str) -> Option<String> {
	let value = input.trim();
	if value.is_empty() {
		None
	} else {
		Some(value.to_string())
	}
}

fn border_style(focused: bool) -> Style {
	if focused {
		Style::default()
			.fg(FOCUSED_PANEL_BORDER_COLOR)
			.add_modifier(Modifier::BOLD)
	} else {
		Style::default().fg(INACTIVE_PANEL_BORDER_COLOR)
	}
}

#[derive(Debug, Clone)]
enum PromptOutcome {
	NextPrompt(PromptState),
	Done(String),
}

#[derive(Debug, Clone)]
enum SelectOutcome {
	NextPrompt(PromptState),
	NextSelect(SelectState),
	Done(String),
}

#[derive(Debug, Clone)]
struct PromptState {
	title: String,
	input: String,
	kind: PromptKind,
}

impl PromptState {
	fn new(title: impl Into<String>, kind: PromptKind) -> Self {
		Self::with_input(title, kind, "")
	}

	fn with_input(title: impl Into<String>, kind: PromptKind, input: &str) -> Self {
		Self {
			title: title.into(),
			input: input.to_string(),
			kind,
		}
	}
}

#[derive(Debug, Clone)]
struct SelectState {
	title: String,
	options: Vec<SelectOption>,
	selected: usize,
	kind: SelectKind,
}

impl SelectState {
	fn new(title: impl Into<String>, kind: SelectKind, options: Vec<SelectOption>) -> Self {
		Self {
			title: title.into(),
			options,
			selected: 0,
			kind,
		}
	}

	fn move_selection(&mut self, delta: i32) {
		if self.options.is_empty() {
			self.selected = 0;
			return;
		}

		if delta > 0 {
			self.selected = (self.selected + delta as usize).min(self.options.len() - 1);
		} else {
			self.selected = self.selected.saturating_sub(delta.unsigned_abs() as usize);
		}
	}

	fn selected_option(&self) -> Option<&SelectOption> {
		self.options.get(self.selected)
	}
}

#[derive(Debug, Clone)]
struct SelectOption {
	label: String,
	value: Option<String>,
	style: Style,
}

impl SelectOption {
	fn new(label: impl Into<String>, value: Option<String>, style: Style) -> Self {
		Self {
			label: label.into(),
			value,
			style,
		}
	}
}

#[derive(Debug, Clone)]
enum PromptKind {
	Title,
	Testers,
	AppendNote,
	ReplaceNotes,
	TaskPercent {
		category: TaskCategory,
	},
	Charter,
	Opportunity,
	AttachFiles,
	BugField {
		index: usize,
		field: BugField,
		chained: bool,
	},
	IssueField {
		index: usize,
		field: IssueField,
		chained: bool,
	},
	OpenReport,
	ExportPath,
}

#[derive(Debug, Clone)]
enum SelectKind {
	AreaOption { level: usize },
	BugFieldToEdit { index: usize },
	IssueFieldToEdit { index: usize },
	RelatedFile { index: usize },
	ExportFormat,
	ClearConfirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusPane {
	Areas,
	Files,
	Bugs,
	Issues,
}

impl FocusPane {
	fn next(self) -> Self {
		match self {
			FocusPane::Areas => FocusPane::Files,
			FocusPane::Files => FocusPane::Bugs,
			FocusPane::Bugs => FocusPane::Issues,
			FocusPane::Issues => FocusPane::Areas,
		}
	}

	fn prev(self) -> Self {
		match self {
			FocusPane::Areas => FocusPane::Issues,
			FocusPane::Files => FocusPane::Areas,
			FocusPane::Bugs => FocusPane::Files,
			FocusPane::Issues => FocusPane::Bugs,
		}
	}
}

#[derive(Debug, Clone)]
enum InputMode {
	Normal,
	Prompt(PromptState),
	Select(SelectState),
}

#[derive(Debug, Clone)]
struct App {
	focus: FocusPane,
	area_index: usize,
	file_index: usize,
	bug_index: usize,
	issue_index: usize,
	mode: InputMode,
	status: String,
}

impl Default for App {
	fn default() -> Self {
		Self {
			focus: FocusPane::Areas,
			area_index: 0,
			file_index: 0,
			bug_index: 0,
			issue_index: 0,
			mode: InputMode::Normal,
			status: "Ready".to_string(),
		}
	}
}

impl App {
	fn clamp_selection<S: SessionStore>(&mut self, controller: &SessionController<S>) {
		let session = controller.session();
		self.area_index = clamp_index(self.area_index, controller.selector().levels().len());
		self.file_index = clamp_index(self.file_index, session.attached_files.len());
		self.bug_index = clamp_index(self.bug_index, session.bugs.len());
		self.issue_index = clamp_index(self.issue_index, session.issues.len());
	}

	fn move_selection<S: SessionStore>(&mut self, delta: i32, controller: &SessionController<S>) {
		let session = controller.session();
		let (index, len) = match self.focus {
			FocusPane::Areas => (&mut self.area_index, controller.selector().levels().len()),
			FocusPane::Files => (&mut self.file_index, session.attached_files.len()),
			FocusPane::Bugs => (&mut self.bug_index, session.bugs.len()),
			FocusPane::Issues => (&mut self.issue_index, session.issues.len()),
		};
		*index = if delta > 0 {
			index.saturating_add(delta as usize)
		} else {
			index.saturating_sub(delta.unsigned_abs() as usize)
		};
		*index = clamp_index(*index, len);
	}

	/// Opens an editing prompt or select unless the session is read-only.
	fn begin_edit<S: SessionStore>(&mut self, controller: &SessionController<S>, mode: InputMode) {
		if controller.is_read_only() {
			self.status = READ_ONLY_HINT.to_string();
		} else {
			self.mode = mode;
		}
	}
}

fn clamp_index(index: usize, len: usize) -> usize {
	if len == 0 { 0 } else { index.min(len - 1) }
}
