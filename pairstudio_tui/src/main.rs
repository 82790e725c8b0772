mod program;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::future::BoxFuture;
use pairstudio_core::{
    Direction as Facing, GameError, GameObserver, GameSession, LevelCatalog, LevelConfig, Settings,
    board::RenderKind,
    session::{LevelReport, Scene},
};
use program::Instruction;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Built-in level to load
    #[arg(short, long, value_name = "LEVEL_ID", default_value = "tutorial_A")]
    level: String,

    /// Level JSON file to load instead of a built-in level
    #[arg(long, value_name = "LEVEL_FILE", conflicts_with = "level")]
    level_file: Option<PathBuf>,

    /// Program to run, one instruction per line
    #[arg(short, long, value_name = "PROGRAM_FILE")]
    program: Option<PathBuf>,

    /// Settings JSON (tile size and animation timing)
    #[arg(short, long, value_name = "SETTINGS_FILE")]
    settings: Option<PathBuf>,

    /// Run the program once without a terminal UI and print the result
    #[arg(long, requires = "program")]
    headless: bool,

    /// Write logs to this file
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

type Step = (String, BoxFuture<'static, Result<String, GameError>>);

/// Forwards results and analytics events into the transcript.
struct TranscriptObserver {
    tx: mpsc::UnboundedSender<String>,
}

impl GameObserver for TranscriptObserver {
    fn level_started(&self, level: &LevelConfig) {
        info!(level = %level.id, "level started");
        let _ = self.tx.send(format!("== {} ==", level.title));
    }

    fn run_started(&self, level_id: &str) {
        info!(level = level_id, "run started");
    }

    fn level_finished(&self, report: &LevelReport) {
        info!(
            level = %report.level_id,
            won = report.won,
            steps = report.step_count,
            "level finished"
        );
        let line = match (&report.reason, report.medal) {
            (Some(reason), _) => format!("Level failed: {reason}"),
            (None, Some(medal)) => {
                format!("Level complete in {} steps ({medal:?})", report.step_count)
            }
            (None, None) => format!("Level complete in {} steps", report.step_count),
        };
        let _ = self.tx.send(line);
    }

    fn level_completed(&self, level_id: &str, completed: usize) {
        info!(level = level_id, completed, "level completed");
    }
}

struct App {
    /// The game core; every agent action goes through its queue.
    game: GameSession,
    /// Latest published board snapshot.
    scene: watch::Receiver<Option<Scene>>,
    program: Vec<Instruction>,
    transcript_tx: mpsc::UnboundedSender<String>,
    transcript_rx: mpsc::UnboundedReceiver<String>,
    transcript: Vec<String>,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(args: &Args, program: Vec<Instruction>) -> Result<Self> {
        let settings = load_settings(args)?;
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        let observer = Arc::new(TranscriptObserver {
            tx: transcript_tx.clone(),
        });
        let mut game = GameSession::new(settings, LevelCatalog::builtin()?, observer);
        match &args.level_file {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading level file {}", path.display()))?;
                game.load_config(LevelConfig::from_json(&json)?)?;
            }
            None => game.load_level(&args.level)?,
        }
        let scene = game.subscribe_scene();

        Ok(App {
            game,
            scene,
            program,
            transcript_tx,
            transcript_rx,
            transcript: Vec::new(),
            should_quit: false,
        })
    }

    /// Queues every instruction up front, then reports results as they land.
    fn run_program(&mut self) {
        if self.program.is_empty() {
            self.note("no program loaded");
            return;
        }
        if let Err(err) = self.game.begin_run() {
            self.note(format!("cannot start: {err}"));
            return;
        }
        let steps = issue_all(&self.game, &self.program);
        self.spawn_reporter(steps);
    }

    fn issue(&mut self, instruction: Instruction) {
        let step = (instruction.to_string(), instruction.issue(&self.game));
        self.spawn_reporter(vec![step]);
    }

    fn spawn_reporter(&self, steps: Vec<Step>) {
        let tx = self.transcript_tx.clone();
        tokio::spawn(async move {
            for (label, result) in steps {
                let line = match result.await {
                    Ok(text) => format!("{label}: {text}"),
                    Err(err) => {
                        warn!(%label, error = %err, "instruction failed");
                        format!("{label}: error: {err}")
                    }
                };
                let _ = tx.send(line);
            }
        });
    }

    fn reset(&mut self) {
        match self.game.reset_level() {
            Ok(()) => self.note("level reset"),
            Err(err) => self.note(format!("reset failed: {err}")),
        }
    }

    fn next_level(&mut self) {
        match self.game.next_level() {
            Ok(Some(_)) => {}
            Ok(None) => self.note("that was the last level"),
            Err(err) => self.note(format!("cannot advance: {err}")),
        }
    }

    fn note(&mut self, line: impl Into<String>) {
        self.transcript.push(line.into());
    }

    /// Pulls in lines produced by background tasks.
    fn tick(&mut self) {
        while let Ok(line) = self.transcript_rx.try_recv() {
            self.transcript.push(line);
        }
        let overflow = self.transcript.len().saturating_sub(200);
        self.transcript.drain(..overflow);
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn issue_all(game: &GameSession, program: &[Instruction]) -> Vec<Step> {
    program
        .iter()
        .map(|instruction| (instruction.to_string(), instruction.issue(game)))
        .collect()
}

fn load_settings(args: &Args) -> Result<Settings> {
    let Some(path) = &args.settings else {
        return Ok(Settings::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings {}", path.display()))?;
    Settings::from_json(&json).with_context(|| format!("parsing settings {}", path.display()))
}

fn load_program(args: &Args) -> Result<Vec<Instruction>> {
    let Some(path) = &args.program else {
        return Ok(Vec::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading program {}", path.display()))?;
    program::parse(&text).with_context(|| format!("parsing program {}", path.display()))
}

fn init_tracing(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();
    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("creating log file {}", path.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else if args.headless {
        builder.with_writer(io::stderr).init();
    }
    // without a log file the terminal UI owns the screen, so logs are dropped
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_tracing(&args)?;
    let program = load_program(&args)?;

    // The action queue runs on the runtime's worker threads while the UI loop blocks here
    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();
    let mut app = App::new(&args, program)?;

    if args.headless {
        return runtime.block_on(run_headless(app));
    }

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop
    let result = run_app(&mut terminal, &mut app);

    // Restore the terminal state
    restore_terminal(&mut terminal)?;

    result
}

/// Runs the program once, printing each result and the final outcome.
async fn run_headless(mut app: App) -> Result<()> {
    app.game.ready().await?;
    app.game.begin_run()?;
    for (label, result) in issue_all(&app.game, &app.program) {
        match result.await {
            Ok(text) => println!("{label}: {text}"),
            Err(err) => println!("{label}: error: {err}"),
        }
    }
    app.tick();
    for line in &app.transcript {
        println!("{line}");
    }

    let scene = app.scene.borrow().clone();
    match scene.and_then(|s| s.outcome) {
        Some(outcome) if outcome.is_won() => Ok(()),
        Some(_) => bail!("level failed"),
        None => bail!("program finished without completing the level"),
    }
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?; // Put terminal in raw mode
    // Use alternate screen and enable mouse capture
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into) // Map io::Error to anyhow::Error
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(50); // Redraw rate
    let mut last_tick = Instant::now();

    loop {
        // Draw the UI
        terminal.draw(|f| ui(f, app))?;

        // Calculate timeout for event polling
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        // Poll for events (keyboard, mouse, etc.)
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Enter => app.run_program(),
                    KeyCode::Up => app.issue(Instruction::Forward(1)),
                    KeyCode::Down => app.issue(Instruction::Backward(1)),
                    KeyCode::Left => app.issue(Instruction::Left),
                    KeyCode::Right => app.issue(Instruction::Right),
                    KeyCode::Char(' ') => app.issue(Instruction::Pick),
                    KeyCode::Char('d') => app.issue(Instruction::Drop),
                    KeyCode::Char('s') => app.issue(Instruction::Survey),
                    KeyCode::Char('r') => app.reset(),
                    KeyCode::Char('n') => app.next_level(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        // Exit loop if requested
        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(70), // Area for the board and status
            Constraint::Percentage(22), // Area for the transcript
            Constraint::Percentage(8),  // Area for help
        ])
        .split(frame.area());
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(main_layout[0]);

    let scene = app.scene.borrow();
    match scene.as_ref() {
        Some(scene) => {
            render_board(frame, top[0], scene);
            render_status(frame, top[1], app, scene);
        }
        None => frame.render_widget(Paragraph::new("loading..."), top[0]),
    }

    render_transcript(frame, main_layout[1], &app.transcript);

    let help_text = Paragraph::new(
        "Enter run | arrows move/turn | space pick | d drop | s survey | r reset | n next | q quit",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Glyph for one render entry. Three cells wide, centred on the tile.
fn glyph(kind: RenderKind, scene: &Scene) -> Option<(&'static str, Style)> {
    let board = &scene.board;
    let g = match kind {
        RenderKind::Floor { .. } => (".:.", Style::default().fg(Color::DarkGray)),
        RenderKind::FloorBorder => return None,
        RenderKind::Stationary(i) => {
            let fixture = board.stationary_objects().get(i)?;
            if fixture.allows_drop() {
                ("=C=", Style::default().fg(Color::Cyan))
            } else {
                ("###", Style::default().fg(Color::Gray))
            }
        }
        RenderKind::Moveable(_) => ("[#]", Style::default().fg(Color::Yellow).bold()),
        RenderKind::Agent => {
            let arrow = match board.agent()?.direction() {
                Facing::North => " ^ ",
                Facing::East => " > ",
                Facing::South => " v ",
                Facing::West => " < ",
            };
            (arrow, Style::default().fg(Color::Red).bold())
        }
    };
    Some(g)
}

/// Paints the board isometrically, back to front in render order.
fn render_board(frame: &mut Frame, area: Rect, scene: &Scene) {
    let board = &scene.board;
    let (tile_width, tile_height) = board.tile_size();
    // a tile is eight columns wide and two rows tall on screen
    let px_per_col = f64::from(tile_width.max(8)) / 8.0;
    let px_per_row = f64::from(tile_height.max(2)) / 2.0;

    let cells: Vec<(i64, i64, &'static str, Style)> = board
        .render_order()
        .iter()
        .filter_map(|item| {
            let (text, style) = glyph(item.kind, scene)?;
            let p = board.screen_position(item.position, item.z);
            Some((
                (p.x / px_per_col).round() as i64,
                (p.y / px_per_row).round() as i64,
                text,
                style,
            ))
        })
        .collect();
    let (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) = (
        cells.iter().map(|c| c.0).min(),
        cells.iter().map(|c| c.1).min(),
        cells.iter().map(|c| c.0).max(),
        cells.iter().map(|c| c.1).max(),
    ) else {
        return;
    };

    let width = (max_x - min_x + 3) as usize;
    let height = (max_y - min_y + 1) as usize;
    let mut canvas = vec![vec![(' ', Style::default()); width]; height];
    for (x, y, text, style) in cells {
        let row = &mut canvas[(y - min_y) as usize];
        for (i, ch) in text.chars().enumerate() {
            // spaces in a glyph let whatever is behind show through
            if ch != ' ' {
                row[(x - min_x) as usize + i] = (ch, style);
            }
        }
    }

    let lines: Vec<Line> = canvas
        .into_iter()
        .map(|row| {
            Line::from(
                row.into_iter()
                    .map(|(ch, style)| Span::styled(ch.to_string(), style))
                    .collect::<Vec<_>>(),
            )
        })
        .collect();

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title(scene.level_id.as_str()).borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

/// Renders level info, the agent and the outcome.
fn render_status(frame: &mut Frame, area: Rect, app: &App, scene: &Scene) {
    let mut lines = Vec::new();
    if let Some(level) = app.game.current_level() {
        lines.push(Line::from(Span::styled(level.title.clone(), Style::default().bold())));
        lines.push(Line::from(level.instructions.clone()));
        lines.push(Line::from(""));
    }
    let budget = scene.max_steps.map_or_else(String::new, |max| format!(" / {max}"));
    lines.push(Line::from(format!("Steps: {}{budget}", scene.steps)));
    if let Some(state) = app.game.get_state() {
        lines.push(Line::from(format!(
            "Robot: ({}, {}) facing {}{}",
            state.row,
            state.col,
            state.direction,
            if state.is_moving { " (moving)" } else { "" }
        )));
        if let Some(item) = &state.carrying {
            lines.push(Line::from(format!("Carrying: {item}")));
        }
    }
    let outcome = match &scene.outcome {
        Some(outcome) if outcome.is_won() => {
            Span::styled("Level complete!", Style::default().fg(Color::Green).bold())
        }
        Some(_) => Span::styled("Level failed", Style::default().fg(Color::Red).bold()),
        None => Span::raw("In progress"),
    };
    lines.push(Line::from(outcome));
    lines.push(Line::from(format!("Completed: {}", app.game.completed_levels().join(", "))));

    let status = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().title("Status").borders(Borders::ALL));
    frame.render_widget(status, area);
}

/// Renders the most recent transcript lines.
fn render_transcript(frame: &mut Frame, area: Rect, transcript: &[String]) {
    let visible = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = transcript
        .iter()
        .skip(transcript.len().saturating_sub(visible))
        .map(|line| ListItem::new(line.as_str()))
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Transcript"));
    frame.render_widget(list, area);
}
