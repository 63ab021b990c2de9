use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::api::envelope::{PaginationParams, SortOrder};
use crate::api::types::{
  CategoryFilters, CreateCategoryRequest, CreateItemRequest, CreateSupplierRequest, ItemFilters,
  MovementType, SupplierFilters, UpdateCategoryRequest, UpdateItemRequest, UpdateSupplierRequest,
};
use crate::state::{ListState, SearchFilter};

#[derive(Parser, Debug)]
#[command(name = "bizdesk")]
#[command(about = "Inventory client for the bizdesk backend")]
#[command(version)]
pub struct Cli {
  /// Path to config file (default: $XDG_CONFIG_HOME/bizdesk/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// Keep session and preferences in memory only
  #[arg(long, global = true)]
  pub ephemeral: bool,

  /// Print results as JSON
  #[arg(long, global = true)]
  pub json: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Store the bearer token used for every request
  Login {
    #[arg(long)]
    token: String,
    /// Firm to select at the same time
    #[arg(long)]
    firm: Option<String>,
  },
  /// Forget token and firm
  Logout,
  /// Show or select the active firm
  Firm {
    id: Option<String>,
    /// Deselect the firm
    #[arg(long, conflicts_with = "id")]
    clear: bool,
  },
  /// Inventory items
  #[command(subcommand)]
  Items(ItemCommand),
  /// Item categories
  #[command(subcommand)]
  Categories(CategoryCommand),
  /// Suppliers
  #[command(subcommand)]
  Suppliers(SupplierCommand),
  /// User preferences
  #[command(subcommand)]
  Prefs(PrefsCommand),
  /// Keep a list on screen and refresh it periodically
  Watch {
    #[arg(long, value_enum, default_value_t = WatchTarget::LowStock)]
    view: WatchTarget,
    /// Refresh period in seconds (default from config)
    #[arg(long)]
    interval: Option<u64>,
    #[command(flatten)]
    filters: ItemFilterArgs,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WatchTarget {
  LowStock,
  Items,
}

// ============================================================================
// Shared arguments
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct PageArgs {
  #[arg(long, default_value_t = 1)]
  pub page: u32,
  /// Page size (default from preferences)
  #[arg(long)]
  pub limit: Option<u32>,
  /// Field to sort by
  #[arg(long)]
  pub sort: Option<String>,
  #[arg(long, requires = "sort")]
  pub desc: bool,
}

impl PageArgs {
  pub fn pagination(&self, default_limit: u32) -> PaginationParams {
    PaginationParams {
      page: self.page.max(1),
      limit: self.limit.unwrap_or(default_limit).max(1),
      sort_by: self.sort.clone(),
      sort_order: self.sort.as_ref().map(|_| {
        if self.desc {
          SortOrder::Desc
        } else {
          SortOrder::Asc
        }
      }),
    }
  }

  /// List state for a one-shot listing: name ascending unless `--sort` says
  /// otherwise.
  pub fn list_state<F: SearchFilter>(&self, filters: F, default_limit: u32) -> ListState<F> {
    let mut state = ListState::with_page_size(self.limit.unwrap_or(default_limit));
    state.set_filters(filters);
    if let Some(field) = &self.sort {
      state.sort_by(field);
      // Sorting by the current field flips its order
      if (state.pagination().sort_order == Some(SortOrder::Desc)) != self.desc {
        state.sort_by(field);
      }
    }
    state.set_page(self.page);
    state
  }
}

#[derive(Args, Debug, Clone)]
pub struct FileArg {
  /// CSV or spreadsheet to upload
  pub path: PathBuf,
}

// ============================================================================
// Items
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct ItemFilterArgs {
  #[arg(long)]
  pub search: Option<String>,
  #[arg(long)]
  pub category: Option<u64>,
  #[arg(long)]
  pub supplier: Option<u64>,
  #[arg(long)]
  pub active: Option<bool>,
  #[arg(long)]
  pub low_stock: bool,
  #[arg(long)]
  pub min_price: Option<f64>,
  #[arg(long)]
  pub max_price: Option<f64>,
  #[arg(long)]
  pub currency: Option<u64>,
}

impl From<&ItemFilterArgs> for ItemFilters {
  fn from(args: &ItemFilterArgs) -> Self {
    ItemFilters {
      search: args.search.clone(),
      category_id: args.category,
      supplier_id: args.supplier,
      is_active: args.active,
      is_low_stock: args.low_stock.then_some(true),
      min_price: args.min_price,
      max_price: args.max_price,
      currency_id: args.currency,
      is_composite: None,
    }
  }
}

#[derive(Args, Debug, Clone)]
pub struct ItemFields {
  #[arg(long)]
  pub name: Option<String>,
  #[arg(long)]
  pub description: Option<String>,
  #[arg(long)]
  pub price: Option<f64>,
  #[arg(long)]
  pub currency: Option<u64>,
  #[arg(long)]
  pub quantity: Option<u32>,
  #[arg(long)]
  pub category: Option<u64>,
  #[arg(long)]
  pub supplier: Option<u64>,
  #[arg(long)]
  pub sku: Option<String>,
  #[arg(long)]
  pub barcode: Option<String>,
  #[arg(long)]
  pub min_stock: Option<u32>,
  #[arg(long)]
  pub max_stock: Option<u32>,
  #[arg(long)]
  pub active: Option<bool>,
}

impl ItemFields {
  /// Name and price are required to create an item.
  pub fn create_request(&self) -> Result<CreateItemRequest, String> {
    let name = self.name.clone().ok_or("--name is required")?;
    let price = self.price.ok_or("--price is required")?;
    Ok(CreateItemRequest {
      name,
      description: self.description.clone(),
      price,
      currency_id: self.currency.unwrap_or(1),
      quantity: self.quantity,
      category_id: self.category,
      supplier_id: self.supplier,
      sku: self.sku.clone(),
      barcode: self.barcode.clone(),
      min_stock_level: self.min_stock,
      max_stock_level: self.max_stock,
      is_active: self.active,
      ..Default::default()
    })
  }

  pub fn update_request(&self) -> UpdateItemRequest {
    UpdateItemRequest {
      name: self.name.clone(),
      description: self.description.clone(),
      price: self.price,
      currency_id: self.currency,
      quantity: self.quantity,
      category_id: self.category,
      supplier_id: self.supplier,
      sku: self.sku.clone(),
      barcode: self.barcode.clone(),
      min_stock_level: self.min_stock,
      max_stock_level: self.max_stock,
      is_active: self.active,
    }
  }
}

#[derive(Subcommand, Debug)]
pub enum ItemCommand {
  /// List items
  #[command(visible_alias = "ls")]
  List {
    #[command(flatten)]
    filters: ItemFilterArgs,
    #[command(flatten)]
    page: PageArgs,
    /// One card per item instead of table rows
    #[arg(long)]
    grid: bool,
  },
  /// Every item, unpaginated
  All,
  /// Show one item
  Show { id: u64 },
  /// Free-text search by name, SKU, barcode or description
  Search {
    query: String,
    #[command(flatten)]
    page: PageArgs,
  },
  Create {
    #[command(flatten)]
    fields: ItemFields,
  },
  Update {
    id: u64,
    #[command(flatten)]
    fields: ItemFields,
  },
  /// Delete one or more items
  #[command(visible_alias = "rm")]
  Delete {
    #[arg(required = true)]
    ids: Vec<u64>,
  },
  /// Items at or below their minimum stock level
  LowStock {
    #[command(flatten)]
    page: PageArgs,
  },
  ByCategory {
    category_id: u64,
    #[command(flatten)]
    page: PageArgs,
  },
  BySupplier {
    supplier_id: u64,
    #[command(flatten)]
    page: PageArgs,
  },
  /// Set the stock level
  Stock {
    id: u64,
    quantity: u32,
    #[arg(long)]
    reason: Option<String>,
  },
  /// Stock movement history of an item
  Movements {
    id: u64,
    #[command(flatten)]
    page: PageArgs,
  },
  /// Record a stock movement
  Move {
    id: u64,
    /// IN, OUT, ADJUSTMENT or TRANSFER
    #[arg(long = "type")]
    movement_type: MovementType,
    #[arg(long, allow_hyphen_values = true)]
    quantity: i64,
    #[arg(long)]
    unit_cost: Option<f64>,
    #[arg(long)]
    reason: Option<String>,
    #[arg(long)]
    reference: Option<String>,
    #[arg(long)]
    notes: Option<String>,
  },
  /// Upload or remove an item image
  Image {
    id: u64,
    #[arg(required_unless_present = "delete")]
    path: Option<PathBuf>,
    #[arg(long, conflicts_with = "path")]
    delete: bool,
  },
  Export {
    #[command(flatten)]
    filters: ItemFilterArgs,
  },
  Import(FileArg),
}

// ============================================================================
// Categories
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct CategoryFilterArgs {
  #[arg(long)]
  pub search: Option<String>,
  #[arg(long)]
  pub active: Option<bool>,
  #[arg(long)]
  pub parent: Option<u64>,
}

impl From<&CategoryFilterArgs> for CategoryFilters {
  fn from(args: &CategoryFilterArgs) -> Self {
    CategoryFilters {
      search: args.search.clone(),
      is_active: args.active,
      parent_category_id: args.parent,
    }
  }
}

#[derive(Args, Debug, Clone)]
pub struct CategoryFields {
  #[arg(long)]
  pub name: Option<String>,
  #[arg(long)]
  pub description: Option<String>,
  #[arg(long)]
  pub parent: Option<u64>,
}

impl CategoryFields {
  pub fn create_request(&self) -> Result<CreateCategoryRequest, String> {
    Ok(CreateCategoryRequest {
      name: self.name.clone().ok_or("--name is required")?,
      description: self.description.clone(),
      parent_category_id: self.parent,
    })
  }

  pub fn update_request(&self) -> UpdateCategoryRequest {
    UpdateCategoryRequest {
      name: self.name.clone(),
      description: self.description.clone(),
      parent_category_id: self.parent,
    }
  }
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
  #[command(visible_alias = "ls")]
  List {
    #[command(flatten)]
    filters: CategoryFilterArgs,
    #[command(flatten)]
    page: PageArgs,
  },
  All,
  /// Categories nested under their parents
  Tree,
  Show { id: u64 },
  Subcategories {
    parent_id: u64,
    #[command(flatten)]
    page: PageArgs,
  },
  Search {
    query: String,
    #[command(flatten)]
    page: PageArgs,
  },
  Stats { id: u64 },
  Create {
    #[command(flatten)]
    fields: CategoryFields,
  },
  Update {
    id: u64,
    #[command(flatten)]
    fields: CategoryFields,
  },
  #[command(visible_alias = "rm")]
  Delete {
    #[arg(required = true)]
    ids: Vec<u64>,
  },
  Export {
    #[command(flatten)]
    filters: CategoryFilterArgs,
  },
  Import(FileArg),
}

// ============================================================================
// Suppliers
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct SupplierFilterArgs {
  #[arg(long)]
  pub search: Option<String>,
  #[arg(long)]
  pub country: Option<String>,
  #[arg(long)]
  pub active: Option<bool>,
}

impl From<&SupplierFilterArgs> for SupplierFilters {
  fn from(args: &SupplierFilterArgs) -> Self {
    SupplierFilters {
      search: args.search.clone(),
      country: args.country.clone(),
      is_active: args.active,
    }
  }
}

#[derive(Args, Debug, Clone)]
pub struct SupplierFields {
  #[arg(long)]
  pub name: Option<String>,
  #[arg(long)]
  pub contact: Option<String>,
  #[arg(long)]
  pub email: Option<String>,
  #[arg(long)]
  pub phone: Option<String>,
  #[arg(long)]
  pub address: Option<String>,
  #[arg(long)]
  pub country: Option<String>,
  #[arg(long)]
  pub tax_id: Option<String>,
  #[arg(long)]
  pub notes: Option<String>,
  #[arg(long)]
  pub currency: Option<u64>,
}

impl SupplierFields {
  pub fn create_request(&self) -> Result<CreateSupplierRequest, String> {
    Ok(CreateSupplierRequest {
      name: self.name.clone().ok_or("--name is required")?,
      contact_person: self.contact.clone(),
      email: self.email.clone(),
      phone: self.phone.clone(),
      address: self.address.clone(),
      country: self.country.clone(),
      tax_id: self.tax_id.clone(),
      notes: self.notes.clone(),
      preferred_currency_id: self.currency,
    })
  }

  pub fn update_request(&self) -> UpdateSupplierRequest {
    UpdateSupplierRequest {
      name: self.name.clone(),
      contact_person: self.contact.clone(),
      email: self.email.clone(),
      phone: self.phone.clone(),
      address: self.address.clone(),
      country: self.country.clone(),
      notes: self.notes.clone(),
    }
  }
}

#[derive(Subcommand, Debug)]
pub enum SupplierCommand {
  #[command(visible_alias = "ls")]
  List {
    #[command(flatten)]
    filters: SupplierFilterArgs,
    #[command(flatten)]
    page: PageArgs,
  },
  All,
  Active {
    #[command(flatten)]
    page: PageArgs,
  },
  ByCountry {
    country: String,
    #[command(flatten)]
    page: PageArgs,
  },
  Show { id: u64 },
  Search {
    query: String,
    #[command(flatten)]
    page: PageArgs,
  },
  Stats { id: u64 },
  Create {
    #[command(flatten)]
    fields: SupplierFields,
  },
  Update {
    id: u64,
    #[command(flatten)]
    fields: SupplierFields,
  },
  /// Activate or deactivate a supplier
  SetActive {
    id: u64,
    #[arg(action = clap::ArgAction::Set)]
    active: bool,
  },
  #[command(visible_alias = "rm")]
  Delete {
    #[arg(required = true)]
    ids: Vec<u64>,
  },
  Export {
    #[command(flatten)]
    filters: SupplierFilterArgs,
  },
  Import(FileArg),
}

// ============================================================================
// Preferences
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
  Show,
  /// theme, language, items_per_page, default_currency or sidebar_collapsed
  Set { name: String, value: String },
  Reset,
}
