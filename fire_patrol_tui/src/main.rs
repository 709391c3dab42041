use anyhow::{Context, Result};
use clap::Parser;
use fire_patrol_core::{
    Position,
    agent::{AgentState, BASE, MAX_BATTERY, new_agent},
    environment::{RunLimits, RunStatus, RunSummary, Simulation, TickRecord},
    map::GridMap,
    scenario::{generate_positions, load_scenario_from_string, validate_counts},
};
use rand::{SeedableRng, rngs::StdRng};
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
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of fire cells to place
    #[arg(short, long, default_value_t = 5)]
    fires: usize,

    /// Number of obstacles to place
    #[arg(short, long, default_value_t = 10)]
    obstacles: usize,

    /// Seed for a reproducible scenario
    #[arg(short, long)]
    seed: Option<u64>,

    /// Hand-written map file, overrides the random scenario
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Delay between ticks in milliseconds
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// CSV file receiving one row per tick
    #[arg(long, value_name = "CSV_FILE", default_value = "logs.csv")]
    log: PathBuf,

    /// Diagnostic log file (filter with RUST_LOG)
    #[arg(long, value_name = "FILE", default_value = "fire_patrol.log")]
    trace_log: PathBuf,

    /// Stop after this many ticks
    #[arg(long, default_value_t = 10_000)]
    max_ticks: u64,

    /// Stop after this many consecutive ticks without a way home
    #[arg(long, default_value_t = 20)]
    max_stuck_ticks: u32,

    /// Run without the terminal UI and print the summary
    #[arg(long)]
    headless: bool,
}

/// Appends one CSV row per tick.
struct TickLog {
    writer: csv::Writer<File>,
}

impl TickLog {
    fn create(path: &Path) -> Result<Self> {
        let writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        Ok(TickLog { writer })
    }

    fn record(&mut self, record: &TickRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }
}

struct App {
    /// The core simulation run.
    simulation: Simulation,
    /// Per-tick CSV stream.
    log: TickLog,
    /// Most recent tick, if any.
    last_record: Option<TickRecord>,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(simulation: Simulation, log: TickLog) -> Self {
        App {
            simulation,
            log,
            last_record: None,
            should_quit: false,
        }
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) -> Result<()> {
        if let Some(record) = self.simulation.step() {
            self.log.record(&record)?;
            self.last_record = Some(record);
        }
        Ok(())
    }

    /// Cancels a running simulation and sets the quit flag.
    fn quit(&mut self) {
        self.simulation.cancel();
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_tracing(&args.trace_log)?;

    let simulation = build_simulation(&args)?;
    let log = TickLog::create(&args.log)?;
    let mut app = App::new(simulation, log);

    if args.headless {
        while !app.simulation.is_finished() {
            app.tick()?;
        }
    } else {
        let mut terminal = setup_terminal()?;
        let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
        restore_terminal(&mut terminal)?;
        result?;
    }

    let summary = app.simulation.summary();
    info!(?summary, "summary");
    println!("{}", format_summary(&summary));
    Ok(())
}

/// Sends `tracing` output to a file so it does not fight the terminal UI.
fn init_tracing(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create trace log {}", path.display()))?;
    let mut filter = EnvFilter::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        if let Ok(directive) = "fire_patrol_core=info".parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

/// Builds the initial state from a map file or a random scenario.
fn build_simulation(args: &Args) -> Result<Simulation> {
    let limits = RunLimits {
        max_ticks: Some(args.max_ticks),
        max_stuck_ticks: Some(args.max_stuck_ticks),
    };

    let state = match &args.map {
        Some(map_file) => {
            let text = std::fs::read_to_string(map_file)
                .with_context(|| format!("Failed to read map file {}", map_file.display()))?;
            let (scenario, base) = load_scenario_from_string(&text)?;
            let map = GridMap::new(scenario.obstacles, base)?;
            AgentState::new(map, scenario.fires)?
        }
        None => {
            validate_counts(args.fires, args.obstacles)?;
            let mut rng = match args.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let scenario = generate_positions(&mut rng, args.fires, args.obstacles, BASE)?;
            new_agent(scenario.fires, scenario.obstacles)?
        }
    };

    info!(
        fires = state.fires.len(),
        obstacles = state.map.obstacles().count(),
        "scenario ready"
    );
    Ok(Simulation::new(state, limits))
}

fn format_summary(summary: &RunSummary) -> String {
    let outcome = match summary.outcome {
        RunStatus::Running => "running",
        RunStatus::Extinguished => "all fires extinguished",
        RunStatus::Stuck => "agent stuck",
        RunStatus::TickLimit => "tick limit reached",
        RunStatus::Cancelled => "cancelled",
    };
    format!(
        "Iterations: {} | Fires: {} | Obstacles: {} | Total reward: {} | Outcome: {}",
        summary.iteration_count,
        summary.fire_count,
        summary.obstacle_count,
        summary.total_reward,
        outcome
    )
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
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
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick()?;
            last_tick = Instant::now();
        }

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
            Constraint::Min(12),   // Area for the map
            Constraint::Length(7), // Area for agent status
            Constraint::Length(2), // Area for help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], app.simulation.state());
    render_status(frame, main_layout[1], app);

    let help_text = if app.simulation.is_finished() {
        "Run finished. Press 'q' or 'Esc' to quit."
    } else {
        "Press 'q' or 'Esc' to stop the run."
    };
    let help = Paragraph::new(help_text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help, main_layout[2]);
}

fn battery_color(battery: u32) -> Color {
    if battery > 50 {
        Color::Blue
    } else if battery > 20 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Renders battery, tank and run totals, or the summary once finished.
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let state = app.simulation.state();
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let percent = (state.battery_level.min(MAX_BATTERY) * 100 / MAX_BATTERY) as u16;
    let agent_block = Block::default().borders(Borders::ALL).title("Agent");
    let agent_area = agent_block.inner(columns[0]);
    frame.render_widget(agent_block, columns[0]);
    let agent_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(agent_area);
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(battery_color(state.battery_level)))
        .percent(percent)
        .label(format!("Battery {}", state.battery_level));
    frame.render_widget(gauge, agent_rows[0]);
    let agent_info = Paragraph::new(vec![
        Line::from(format!(
            "Position: ({}, {})",
            state.position.x, state.position.y
        )),
        Line::from(format!("Extinguisher: {}", state.extinguisher_count)),
        Line::from(format!("Fires remaining: {}", state.fires.len())),
    ]);
    frame.render_widget(agent_info, agent_rows[1]);

    let summary = app.simulation.summary();
    let run_lines = if app.simulation.is_finished() {
        vec![
            Line::from(Span::styled("Run over", Style::default().bold())),
            Line::from(format_summary(&summary)),
        ]
    } else {
        vec![
            Line::from(format!("Iteration: {}", summary.iteration_count)),
            Line::from(format!("Total reward: {}", summary.total_reward)),
            Line::from(format!(
                "Last reward: {}",
                app.last_record
                    .map(|r| r.reward.to_string())
                    .unwrap_or_else(|| "-".to_string())
            )),
        ]
    };
    let run_widget = Paragraph::new(run_lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Run"));
    frame.render_widget(run_widget, columns[1]);
}

/// Renders the field onto the frame.
fn render_map(frame: &mut Frame, area: Rect, state: &AgentState) {
    let map = &state.map;
    let mut lines: Vec<Line> = Vec::with_capacity(map.height());

    for y in 0..map.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(map.width());
        for x in 0..map.width() {
            let cell = Position::new(x, y);
            let span = if cell == state.position {
                Span::styled(
                    "@ ",
                    Style::default().fg(battery_color(state.battery_level)).bold(),
                )
            } else if map.is_obstacle(cell) {
                Span::styled("# ", Style::default().fg(Color::DarkGray))
            } else if state.fires.contains(&cell) {
                Span::styled("* ", Style::default().fg(Color::Red))
            } else if cell == map.base() {
                Span::styled("B ", Style::default().fg(Color::Green))
            } else if state.extinguished.contains(&cell) {
                Span::styled(". ", Style::default().fg(Color::Gray))
            } else {
                Span::raw("  ")
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let title = format!("Fire Patrol - {} fires remaining", state.fires.len());
    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}
