use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::envelope::{Paginated, PaginationParams};
use crate::api::error::ApiError;
use crate::api::gateway::{ProgressFn, UploadFile};
use crate::api::types::{
  Category, CreateStockMovementRequest, ItemFilters, StockMovement, StockUpdate, Supplier,
};
use crate::cli::{CategoryCommand, Command, ItemCommand, PrefsCommand, SupplierCommand, WatchTarget};
use crate::config::Config;
use crate::db::LocalStore;
use crate::event::{Event, EventHandler};
use crate::notify::{ChannelNotifier, ConsoleNotifier, Notification, Notifier};
use crate::prefs::{PreferenceStore, Preferences};
use crate::queries::Backend;
use crate::session::{SessionContext, SessionStatus};
use crate::state::{ListState, ViewMode};
use crate::views::{item_card, item_row, ItemListView, LowStockView, View, ViewAction};

/// Ticks drive query polling in watch mode
const TICK_RATE: Duration = Duration::from_millis(250);

pub struct App {
  config: Config,
  backend: Backend,
  prefs: &'static PreferenceStore,
  notices: Option<mpsc::UnboundedReceiver<Notification>>,
  json: bool,
  /// A mutation failed; its notification has been shown already
  failed: bool,
}

impl App {
  pub fn new(config: Config, ephemeral: bool, json: bool) -> Result<Self> {
    let store = Arc::new(if ephemeral {
      LocalStore::open_in_memory()?
    } else {
      LocalStore::open()?
    });
    let session = Arc::new(SessionContext::persistent(store.clone())?);
    let prefs = PreferenceStore::load(store)?.install();

    let (tx, rx) = mpsc::unbounded_channel();
    let backend = Backend::new(&config, session, Arc::new(ChannelNotifier::new(tx)))?;
    info!(
      "Using backend at {} (firm {:?})",
      config.api.base_url,
      backend.session().firm_id()
    );

    Ok(Self {
      config,
      backend,
      prefs,
      notices: Some(rx),
      json,
      failed: false,
    })
  }

  pub async fn run(&mut self, command: Command) -> Result<ExitCode> {
    let result = self.dispatch(command).await;
    self.flush_notices();

    if self.backend.session().status() == SessionStatus::LoginRequired {
      eprintln!("Session expired or rejected. Run `bizdesk login --token <TOKEN>`.");
    }
    if let Err(e) = result {
      match e.downcast_ref::<ApiError>() {
        Some(api) if self.json => {
          self.show(&api.to_envelope());
          return Ok(ExitCode::FAILURE);
        }
        _ => return Err(e),
      }
    }
    Ok(if self.failed {
      ExitCode::FAILURE
    } else {
      ExitCode::SUCCESS
    })
  }

  async fn dispatch(&mut self, command: Command) -> Result<()> {
    match command {
      Command::Login { token, firm } => {
        self.backend.session().set_token(token)?;
        if firm.is_some() {
          self.backend.switch_firm(firm)?;
        }
        println!("Logged in");
      }
      Command::Logout => {
        self.backend.logout()?;
        println!("Logged out");
      }
      Command::Firm { id, clear } => {
        if clear {
          self.backend.switch_firm(None)?;
        } else if id.is_some() {
          self.backend.switch_firm(id)?;
        }
        match self.backend.session().firm_id() {
          Some(firm) => println!("Active firm: {}", firm),
          None => println!("No firm selected"),
        }
      }
      Command::Items(cmd) => self.items(cmd).await?,
      Command::Categories(cmd) => self.categories(cmd).await?,
      Command::Suppliers(cmd) => self.suppliers(cmd).await?,
      Command::Prefs(cmd) => self.preferences(cmd)?,
      Command::Watch {
        view,
        interval,
        filters,
      } => {
        let interval = Duration::from_secs(interval.unwrap_or(self.config.watch.interval_secs).max(1));
        self.watch(view, interval, ItemFilters::from(&filters)).await?;
      }
    }
    Ok(())
  }

  fn page_size(&self) -> u32 {
    self.prefs.get().items_per_page
  }

  // --------------------------------------------------------------------------
  // Items
  // --------------------------------------------------------------------------

  async fn items(&mut self, cmd: ItemCommand) -> Result<()> {
    let items = self.backend.items.clone();
    let limit = self.page_size();
    match cmd {
      ItemCommand::List {
        filters,
        page,
        grid,
      } => {
        let mut state = page.list_state(ItemFilters::from(&filters), limit);
        if grid {
          state.set_view_mode(ViewMode::Grid);
        }
        let result = items.list(state.filters(), state.pagination()).await?;
        let row = match state.view_mode() {
          ViewMode::Table => item_row,
          ViewMode::Grid => item_card,
        };
        self.page(&result.data, row);
      }
      ItemCommand::All => {
        let result = items.all().await?;
        self.rows(&result.data, item_row);
      }
      ItemCommand::Show { id } => {
        let result = items.detail(id).await?;
        self.show(&result.data);
      }
      ItemCommand::Search { query, page } => {
        let result = items.search(&query, &page.pagination(limit)).await?;
        self.page(&result.data, item_row);
      }
      ItemCommand::Create { fields } => {
        let request = fields.create_request().map_err(|e| eyre!(e))?;
        let result = items.create(&request).await;
        if let Some(item) = self.reported(result) {
          self.show(&item);
        }
      }
      ItemCommand::Update { id, fields } => {
        let result = items.update(id, &fields.update_request()).await;
        if let Some(item) = self.reported(result) {
          self.show(&item);
        }
      }
      ItemCommand::Delete { ids } => {
        let result = match ids.as_slice() {
          [id] => items.delete(*id).await,
          _ => items.bulk_delete(&ids).await,
        };
        self.reported(result);
      }
      ItemCommand::LowStock { page } => {
        let result = items.low_stock(&page.pagination(limit)).await?;
        self.page(&result.data, item_row);
      }
      ItemCommand::ByCategory { category_id, page } => {
        let result = items.by_category(category_id, &page.pagination(limit)).await?;
        self.page(&result.data, item_row);
      }
      ItemCommand::BySupplier { supplier_id, page } => {
        let result = items.by_supplier(supplier_id, &page.pagination(limit)).await?;
        self.page(&result.data, item_row);
      }
      ItemCommand::Stock {
        id,
        quantity,
        reason,
      } => {
        let result = items.update_stock(id, &StockUpdate { quantity, reason }).await;
        if let Some(item) = self.reported(result) {
          self.show(&item);
        }
      }
      ItemCommand::Movements { id, page } => {
        let result = items.movements(id, &page.pagination(limit)).await?;
        self.page(&result.data, movement_row);
      }
      ItemCommand::Move {
        id,
        movement_type,
        quantity,
        unit_cost,
        reason,
        reference,
        notes,
      } => {
        let request = CreateStockMovementRequest {
          item_id: id,
          movement_type,
          quantity,
          unit_cost,
          reason,
          reference_number: reference,
          notes,
        };
        let result = items.create_movement(&request).await;
        if let Some(movement) = self.reported(result) {
          self.show(&movement);
        }
      }
      ItemCommand::Image { id, path, delete } => {
        if delete {
          let result = items.delete_image(id).await;
          self.reported(result);
        } else if let Some(path) = path {
          let file = upload_file(&path).await?;
          let result = items.upload_image(id, file, Some(progress_bar())).await;
          if let Some(image) = self.reported(result) {
            self.show(&image);
          }
        }
      }
      ItemCommand::Export { filters } => {
        let result = items.export(&ItemFilters::from(&filters)).await;
        if let Some(export) = self.reported(result) {
          self.show(&export);
        }
      }
      ItemCommand::Import(file) => {
        let file = upload_file(&file.path).await?;
        let result = items.import(file, Some(progress_bar())).await;
        if let Some(report) = self.reported(result) {
          self.show(&report);
        }
      }
    }
    Ok(())
  }

  // --------------------------------------------------------------------------
  // Categories
  // --------------------------------------------------------------------------

  async fn categories(&mut self, cmd: CategoryCommand) -> Result<()> {
    let categories = self.backend.categories.clone();
    let limit = self.page_size();
    match cmd {
      CategoryCommand::List { filters, page } => {
        let result = categories.list(&(&filters).into(), &page.pagination(limit)).await?;
        self.page(&result.data, category_row);
      }
      CategoryCommand::All => {
        let result = categories.all().await?;
        self.rows(&result.data, category_row);
      }
      CategoryCommand::Tree => {
        let result = categories.tree().await?;
        if self.json {
          self.show(&result.data);
        } else {
          let mut out = String::new();
          for category in &result.data {
            tree_lines(category, 0, &mut out);
          }
          print!("{}", out);
        }
      }
      CategoryCommand::Show { id } => {
        let result = categories.detail(id).await?;
        self.show(&result.data);
      }
      CategoryCommand::Subcategories { parent_id, page } => {
        let result = categories.subcategories(parent_id, &page.pagination(limit)).await?;
        self.page(&result.data, category_row);
      }
      CategoryCommand::Search { query, page } => {
        let result = categories.search(&query, &page.pagination(limit)).await?;
        self.page(&result.data, category_row);
      }
      CategoryCommand::Stats { id } => {
        let result = categories.stats(id).await?;
        self.show(&result.data);
      }
      CategoryCommand::Create { fields } => {
        let request = fields.create_request().map_err(|e| eyre!(e))?;
        let result = categories.create(&request).await;
        if let Some(category) = self.reported(result) {
          self.show(&category);
        }
      }
      CategoryCommand::Update { id, fields } => {
        let result = categories.update(id, &fields.update_request()).await;
        if let Some(category) = self.reported(result) {
          self.show(&category);
        }
      }
      CategoryCommand::Delete { ids } => {
        let result = match ids.as_slice() {
          [id] => categories.delete(*id).await,
          _ => categories.bulk_delete(&ids).await,
        };
        self.reported(result);
      }
      CategoryCommand::Export { filters } => {
        let result = categories.export(&(&filters).into()).await;
        if let Some(export) = self.reported(result) {
          self.show(&export);
        }
      }
      CategoryCommand::Import(file) => {
        let file = upload_file(&file.path).await?;
        let result = categories.import(file, Some(progress_bar())).await;
        if let Some(report) = self.reported(result) {
          self.show(&report);
        }
      }
    }
    Ok(())
  }

  // --------------------------------------------------------------------------
  // Suppliers
  // --------------------------------------------------------------------------

  async fn suppliers(&mut self, cmd: SupplierCommand) -> Result<()> {
    let suppliers = self.backend.suppliers.clone();
    let limit = self.page_size();
    match cmd {
      SupplierCommand::List { filters, page } => {
        let result = suppliers.list(&(&filters).into(), &page.pagination(limit)).await?;
        self.page(&result.data, supplier_row);
      }
      SupplierCommand::All => {
        let result = suppliers.all().await?;
        self.rows(&result.data, supplier_row);
      }
      SupplierCommand::Active { page } => {
        let result = suppliers.active(&page.pagination(limit)).await?;
        self.page(&result.data, supplier_row);
      }
      SupplierCommand::ByCountry { country, page } => {
        let result = suppliers.by_country(&country, &page.pagination(limit)).await?;
        self.page(&result.data, supplier_row);
      }
      SupplierCommand::Show { id } => {
        let result = suppliers.detail(id).await?;
        self.show(&result.data);
      }
      SupplierCommand::Search { query, page } => {
        let result = suppliers.search(&query, &page.pagination(limit)).await?;
        self.page(&result.data, supplier_row);
      }
      SupplierCommand::Stats { id } => {
        let result = suppliers.stats(id).await?;
        self.show(&result.data);
      }
      SupplierCommand::Create { fields } => {
        let request = fields.create_request().map_err(|e| eyre!(e))?;
        let result = suppliers.create(&request).await;
        if let Some(supplier) = self.reported(result) {
          self.show(&supplier);
        }
      }
      SupplierCommand::Update { id, fields } => {
        let result = suppliers.update(id, &fields.update_request()).await;
        if let Some(supplier) = self.reported(result) {
          self.show(&supplier);
        }
      }
      SupplierCommand::SetActive { id, active } => {
        let result = suppliers.toggle_status(id, active).await;
        if let Some(supplier) = self.reported(result) {
          self.show(&supplier);
        }
      }
      SupplierCommand::Delete { ids } => {
        let result = match ids.as_slice() {
          [id] => suppliers.delete(*id).await,
          _ => suppliers.bulk_delete(&ids).await,
        };
        self.reported(result);
      }
      SupplierCommand::Export { filters } => {
        let result = suppliers.export(&(&filters).into()).await;
        if let Some(export) = self.reported(result) {
          self.show(&export);
        }
      }
      SupplierCommand::Import(file) => {
        let file = upload_file(&file.path).await?;
        let result = suppliers.import(file, Some(progress_bar())).await;
        if let Some(report) = self.reported(result) {
          self.show(&report);
        }
      }
    }
    Ok(())
  }

  // --------------------------------------------------------------------------
  // Preferences
  // --------------------------------------------------------------------------

  fn preferences(&mut self, cmd: PrefsCommand) -> Result<()> {
    let prefs = match cmd {
      PrefsCommand::Show => self.prefs.get(),
      PrefsCommand::Set { name, value } => self.prefs.update(|p| p.set(&name, &value))?,
      PrefsCommand::Reset => self.prefs.reset()?,
    };
    if self.json {
      self.show(&prefs);
    } else {
      print!("{}", preferences_text(&prefs));
    }
    Ok(())
  }

  // --------------------------------------------------------------------------
  // Watch
  // --------------------------------------------------------------------------

  async fn watch(&mut self, target: WatchTarget, interval: Duration, filters: ItemFilters) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE);
    events.forward_cache(self.backend.cache().subscribe());
    events.forward_session(self.backend.session().subscribe());
    if let Some(notices) = self.notices.take() {
      events.forward_notices(notices);
    }
    events.forward_lines(std::io::BufReader::new(std::io::stdin()));

    let items = self.backend.items.clone();
    let limit = self.page_size();
    match target {
      WatchTarget::LowStock => {
        let view = LowStockView::new(items, PaginationParams::page(1, limit));
        self.run_view(view, &mut events, interval).await
      }
      WatchTarget::Items => {
        let mut state = ListState::with_page_size(limit);
        state.set_filters(filters);
        self.run_view(ItemListView::new(items, state), &mut events, interval).await
      }
    }
  }

  async fn run_view<V: View>(&self, mut view: V, events: &mut EventHandler, interval: Duration) -> Result<()> {
    let mut last_refresh = Instant::now();
    let mut notice: Option<Notification> = None;
    draw(&view, notice.as_ref())?;

    while let Some(event) = events.next().await {
      let redraw = match event {
        Event::Tick => {
          if last_refresh.elapsed() >= interval {
            last_refresh = Instant::now();
            debug!("Refreshing {}", view.title());
            // Nothing cached yet (e.g. the first load failed): fetch directly
            if self.backend.cache().invalidate(&view.watched()).is_empty() {
              view.refresh();
            }
          }
          view.tick()
        }
        Event::Cache(change) => {
          view.on_cache_event(&change);
          false
        }
        Event::Session(SessionStatus::LoginRequired) => break,
        Event::Session(_) => false,
        Event::Notice(n) => {
          notice = Some(n);
          true
        }
        Event::Input(line) => match view.handle_input(&line) {
          ViewAction::Quit => break,
          ViewAction::Redraw => true,
          ViewAction::None => false,
        },
        Event::Interrupt => break,
      };
      if redraw {
        draw(&view, notice.as_ref())?;
      }
    }
    Ok(())
  }

  // --------------------------------------------------------------------------
  // Output
  // --------------------------------------------------------------------------

  /// Mutation errors were reported as notifications; only remember that one
  /// happened.
  fn reported<T>(&mut self, result: std::result::Result<T, ApiError>) -> Option<T> {
    match result {
      Ok(value) => Some(value),
      Err(e) => {
        debug!("Mutation failed: {:?}", e);
        self.failed = true;
        None
      }
    }
  }

  fn flush_notices(&mut self) {
    if let Some(notices) = &mut self.notices {
      while let Ok(notice) = notices.try_recv() {
        ConsoleNotifier.notify(notice);
      }
    }
  }

  fn show<T: Serialize>(&self, value: &T) {
    match serde_json::to_string_pretty(value) {
      Ok(json) => println!("{}", json),
      Err(e) => eprintln!("Cannot print result: {}", e),
    }
  }

  fn rows<T: Serialize>(&self, rows: &[T], row: fn(&T) -> String) {
    if self.json {
      self.show(&rows);
      return;
    }
    for r in rows {
      println!("{}", row(r));
    }
  }

  fn page<T: Serialize>(&self, page: &Paginated<T>, row: fn(&T) -> String) {
    if self.json {
      self.show(page);
      return;
    }
    if page.is_empty() {
      println!("No results");
      return;
    }
    for r in &page.data {
      println!("{}", row(r));
    }
    println!(
      "page {}/{} · {} total",
      page.page,
      page.total_pages.max(1),
      page.total
    );
  }
}

async fn upload_file(path: &Path) -> Result<UploadFile> {
  Ok(UploadFile::from_path(path).await?)
}

/// Progress on stderr so stdout stays parseable
fn progress_bar() -> ProgressFn {
  Arc::new(|percent| {
    eprint!("\rUploading... {:>3}%", percent);
    if percent >= 100 {
      eprintln!();
    }
  })
}

fn draw(view: &impl View, notice: Option<&Notification>) -> Result<()> {
  let mut out = std::io::stdout().lock();
  // Clear screen, cursor home
  write!(out, "\x1b[2J\x1b[H")?;
  writeln!(out, "{}", chrono::Local::now().format("%H:%M:%S"))?;
  write!(out, "{}", view.render())?;
  writeln!(out, "\n{}  (type a command, then Enter)", view.shortcuts())?;
  if let Some(n) = notice {
    writeln!(out, "\n{}", n)?;
  }
  out.flush()?;
  Ok(())
}

fn category_row(c: &Category) -> String {
  format!(
    "{:>6}  {:<32} {}",
    c.id,
    c.name,
    c.parent_category_id
      .map(|p| format!("parent {}", p))
      .unwrap_or_default()
  )
}

fn tree_lines(category: &Category, depth: usize, out: &mut String) {
  out.push_str(&format!("{}{} ({})\n", "  ".repeat(depth), category.name, category.id));
  for child in &category.children {
    tree_lines(child, depth + 1, out);
  }
}

fn supplier_row(s: &Supplier) -> String {
  format!(
    "{:>6}  {:<32} {:<16} {}",
    s.id,
    s.name,
    s.country.as_deref().unwrap_or("-"),
    if s.is_active.unwrap_or(true) { "active" } else { "inactive" }
  )
}

fn movement_row(m: &StockMovement) -> String {
  format!(
    "{:>6}  {:<19} {:<10} {:>+6}  {}",
    m.id,
    m.created_at,
    m.movement_type,
    m.quantity,
    m.reason.as_deref().unwrap_or("")
  )
}

fn preferences_text(p: &Preferences) -> String {
  format!(
    "theme              {}\nlanguage           {}\nitems_per_page     {}\ndefault_currency   {}\nsidebar_collapsed  {}\n",
    p.theme, p.language, p.items_per_page, p.default_currency, p.sidebar_collapsed
  )
}
