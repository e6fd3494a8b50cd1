mod ui;

use std::{
    error::Error,
    io::{self, stdin},
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Local, Utc};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use tracing::{info, warn};
use webbrowser::Browser;

use loctag::{
    acquisition::{LocationController, StartOutcome},
    app_dirs::AppDirs,
    config::{parse_meters, Config, ConfigStore, FileConfigStore, GeocoderKind},
    fix::Coordinate,
    fix_log,
    geocode::{AddressResolver, GazetteerResolver, NominatimResolver},
    logging,
    position::{PositionSource, ReplayFeed, ReplaySource, SimulatedFeed, SimulatedSource},
    readout::{map_url, Readout, MSG_ACCESS_DENIED, MSG_SERVICES_DISABLED},
    runtime::{AppEvent, EventSender, FixedTicker, Runner, TerminalEventSource},
    store::TagStore,
    tag::{self, DetailsForm, TaggedLocation},
};

const TICK_RATE_MS: u64 = 100;
const DEFAULT_ORIGIN: &str = "37.33182,-122.03118";

/// find out where you are and tag it
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Acquires a location fix that converges on a desired accuracy, looks up its address, and lets you tag and revisit the places you have been."
)]
pub struct Cli {
    /// replay fixes from a CSV fix log instead of simulating them
    #[clap(short = 'f', long)]
    fixes: Option<PathBuf>,

    /// centre of the simulated fixes, as LAT,LON
    #[clap(long, value_parser = parse_origin, default_value = DEFAULT_ORIGIN, allow_hyphen_values = true)]
    origin: Coordinate,

    /// accuracy in meters at which acquisition stops
    #[clap(short = 'a', long, value_parser = parse_meters)]
    desired_accuracy: Option<f64>,

    /// JSON gazetteer used for offline address lookup
    #[clap(long)]
    places: Option<PathBuf>,

    /// look addresses up with OpenStreetMap Nominatim
    #[clap(long, conflicts_with = "places")]
    nominatim: bool,

    /// print saved locations and exit
    #[clap(long)]
    list: bool,

    /// location database to use instead of the default
    #[clap(long)]
    db: Option<PathBuf>,

    /// write the effective settings to the config file
    #[clap(long)]
    save_config: bool,
}

fn parse_origin(s: &str) -> Result<Coordinate, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{s}'"))?;
    let latitude: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude '{}'", lat.trim()))?;
    let longitude: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude '{}'", lon.trim()))?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("coordinate out of range: {latitude},{longitude}"));
    }
    Ok(Coordinate::new(latitude, longitude))
}

impl Cli {
    /// Flags given on the command line win over the config file
    fn apply(&self, mut config: Config) -> Config {
        if let Some(accuracy) = self.desired_accuracy {
            config.desired_accuracy_m = accuracy;
        }
        if let Some(places) = &self.places {
            config.places_path = Some(places.clone());
            config.geocoder = GeocoderKind::Gazetteer;
        }
        if self.nominatim {
            config.geocoder = GeocoderKind::Nominatim;
        }
        config
    }

    fn open_store(&self) -> Result<TagStore, Box<dyn Error>> {
        let store = match &self.db {
            Some(db) => {
                let photos = db.parent().unwrap_or(Path::new(".")).join("photos");
                TagStore::open(db, photos)?
            }
            None => TagStore::open_default()?,
        };
        Ok(store)
    }
}

pub type Controller = LocationController<Box<dyn PositionSource>, Box<dyn AddressResolver>>;

fn build_source(cli: &Cli, tx: EventSender) -> Result<Box<dyn PositionSource>, Box<dyn Error>> {
    Ok(match &cli.fixes {
        Some(path) => {
            let entries = fix_log::read_path(path)?;
            info!(path = %path.display(), entries = entries.len(), "replaying fix log");
            Box::new(ReplaySource::new(ReplayFeed::new(entries), tx))
        }
        None => {
            info!(origin = ?cli.origin, "simulating fixes");
            Box::new(SimulatedSource::new(SimulatedFeed::new(cli.origin), tx))
        }
    })
}

fn build_resolver(
    config: &Config,
    tx: EventSender,
) -> Result<Box<dyn AddressResolver>, Box<dyn Error>> {
    Ok(match config.geocoder {
        GeocoderKind::Nominatim => Box::new(NominatimResolver::new(
            config.nominatim_user_agent.clone(),
            tx,
        )),
        GeocoderKind::Gazetteer => {
            let resolver = match &config.places_path {
                Some(path) => GazetteerResolver::load(path, tx)?,
                None => GazetteerResolver::new(vec![], tx),
            };
            Box::new(resolver.with_radius(config.gazetteer_radius_m))
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Current,
    Details,
    Locations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    pub controller: Controller,
    pub store: TagStore,
    pub state: AppState,
    pub form: Option<DetailsForm>,
    pub locations: Vec<TaggedLocation>,
    pub selected: usize,
    pub notice: Option<String>,
}

impl App {
    pub fn new(controller: Controller, store: TagStore) -> Self {
        Self {
            controller,
            store,
            state: AppState::Current,
            form: None,
            locations: vec![],
            selected: 0,
            notice: None,
        }
    }

    pub fn readout(&self) -> Readout {
        Readout::from(&self.controller.snapshot())
    }

    pub fn selected_location(&self) -> Option<&TaggedLocation> {
        self.locations.get(self.selected)
    }

    pub fn on_key(&mut self, key: KeyEvent, now: DateTime<Utc>) -> Flow {
        if key.kind != KeyEventKind::Press {
            return Flow::Continue;
        }
        // ctrl+c quits from anywhere
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Flow::Quit;
        }

        match self.state {
            AppState::Current => return self.on_current_key(key, now),
            AppState::Details => self.on_details_key(key),
            AppState::Locations => self.on_locations_key(key),
        }
        Flow::Continue
    }

    fn on_current_key(&mut self, key: KeyEvent, now: DateTime<Utc>) -> Flow {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return Flow::Quit,
            KeyCode::Char('g') => {
                let outcome = self.controller.get_location(now);
                info!(?outcome, "get location");
                self.notice = match outcome {
                    StartOutcome::AuthorizationRequested => {
                        Some("Location access requested, press g again".to_string())
                    }
                    StartOutcome::PermissionDenied => Some(MSG_ACCESS_DENIED.to_string()),
                    StartOutcome::ServiceDisabled => Some(MSG_SERVICES_DISABLED.to_string()),
                    StartOutcome::Started | StartOutcome::Stopped => None,
                };
            }
            KeyCode::Char('t') => self.tag_current(Local::now()),
            KeyCode::Char('l') => {
                self.reload_locations();
                self.state = AppState::Locations;
            }
            KeyCode::Char('o') => self.open_map(),
            _ => {}
        }
        Flow::Continue
    }

    fn on_details_key(&mut self, key: KeyEvent) {
        let Some(form) = self.form.as_mut() else {
            self.state = AppState::Current;
            return;
        };
        match key.code {
            KeyCode::Esc => self.close_form(),
            KeyCode::Enter => self.save_form(),
            KeyCode::Tab => form.focus_next(),
            KeyCode::Left => form.previous_category(),
            KeyCode::Right => form.next_category(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Char(c) => form.push_char(c),
            _ => {}
        }
    }

    fn on_locations_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('b') => self.state = AppState::Current,
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                if self.selected + 1 < self.locations.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(form) = self.selected_location().map(DetailsForm::for_existing) {
                    self.form = Some(form);
                    self.state = AppState::Details;
                }
            }
            KeyCode::Char('d') => self.delete_selected(),
            _ => {}
        }
    }

    /// Opens the details screen for the best fix, if there is one
    fn tag_current(&mut self, date: DateTime<Local>) {
        let Some(fix) = self.controller.best_fix() else {
            return;
        };
        self.form = Some(DetailsForm::for_new(
            fix.coordinate,
            self.controller.placemark().cloned(),
            date,
        ));
        self.notice = None;
        self.state = AppState::Details;
    }

    fn close_form(&mut self) {
        let editing = self.form.take().is_some_and(|f| f.is_editing());
        self.state = if editing {
            AppState::Locations
        } else {
            AppState::Current
        };
    }

    fn save_form(&mut self) {
        let Some(form) = &self.form else {
            return;
        };
        let saved = form
            .to_draft()
            .map_err(|e| e.to_string())
            .and_then(|draft| self.store.save(&draft).map_err(|e| e.to_string()));

        match saved {
            Ok(outcome) => {
                info!(id = outcome.id(), "{}", outcome.label());
                self.notice = Some(outcome.label().to_string());
                self.reload_locations();
                self.close_form();
            }
            Err(e) => {
                warn!(error = %e, "saving location failed");
                self.notice = Some(e);
            }
        }
    }

    fn delete_selected(&mut self) {
        let Some(id) = self.selected_location().map(|l| l.id) else {
            return;
        };
        match self.store.delete(id) {
            Ok(()) => {
                info!(id, "deleted location");
                self.notice = Some("Deleted".to_string());
            }
            Err(e) => {
                warn!(id, error = %e, "deleting location failed");
                self.notice = Some(e.to_string());
            }
        }
        self.reload_locations();
    }

    fn reload_locations(&mut self) {
        match self.store.all() {
            Ok(locations) => self.locations = locations,
            Err(e) => {
                warn!(error = %e, "loading locations failed");
                self.notice = Some(e.to_string());
                self.locations.clear();
            }
        }
        self.selected = self.selected.min(self.locations.len().saturating_sub(1));
    }

    fn open_map(&mut self) {
        let Some(fix) = self.controller.best_fix() else {
            return;
        };
        if !Browser::is_available() {
            self.notice = Some("No browser available".to_string());
            return;
        }
        if let Err(e) = webbrowser::open(&map_url(&fix.coordinate)) {
            warn!(error = %e, "opening map failed");
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config_store = FileConfigStore::new();
    let config = cli.apply(config_store.load());
    if cli.save_config {
        config_store.save(&config)?;
    }

    if let Some(path) = AppDirs::log_path() {
        if let Err(e) = logging::init(&path) {
            eprintln!("logging disabled: {e}");
        }
    }

    let store = cli.open_store()?;

    if cli.list {
        print!("{}", tag::listing(&store.all()?));
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let events = TerminalEventSource::new();
    let source = build_source(&cli, events.sender())?;
    let resolver = build_resolver(&config, events.sender())?;
    let controller = LocationController::new(source, resolver, config.acquisition_settings());
    let mut app = App::new(controller, store);
    let runner = Runner::new(events, FixedTicker::new(Duration::from_millis(TICK_RATE_MS)));

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<TerminalEventSource, FixedTicker>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui(app, f))?;

        let now = Utc::now();
        match runner.step() {
            AppEvent::Key(key) => {
                if app.on_key(key, now) == Flow::Quit {
                    break;
                }
            }
            event => {
                app.controller.handle(event, now);
            }
        }
    }

    app.controller.stop();
    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}
