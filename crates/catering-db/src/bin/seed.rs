//! # Demo Data Generator
//!
//! Populates the database with demo quotes, invoices and change requests.
//!
//! ## Usage
//! ```bash
//! # Generate 25 quotes (default)
//! cargo run -p catering-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p catering-db --bin seed -- --count 100
//!
//! # Specify database path
//! cargo run -p catering-db --bin seed -- --db ./data/catering.db
//! ```
//!
//! ## Generated Data
//! Each quote gets:
//! - A rotating menu (proteins, sides, desserts, drinks, occasional add-ons)
//! - A guest count between 20 and 300 and one of the three service types
//! - An event date 3 to 20 weeks out
//! - A sent invoice with generated line items and a portal token
//!
//! Every third invoice also gets a pending change request.

use chrono::{Duration, Utc};
use std::env;
use uuid::Uuid;

use catering_core::menu::{generate_line_items, PriceBook};
use catering_core::patch::{CategoryChange, MenuChanges, RequestedChanges};
use catering_core::tax::TaxCalculationService;
use catering_core::{
    ChangeRequest, ChangeRequestStatus, Invoice, InvoiceStatus, ManualOverrides, MenuSelections,
    QuoteRequest, QuoteStatus, QuoteWorkflowStatus, ServiceType, DEFAULT_TOKEN_TTL_DAYS,
};
use catering_db::{Database, DbConfig};

const PROTEINS: &[&str] = &["Fried Chicken", "Pulled Pork", "Brisket", "Catfish", "Smoked Turkey"];
const SIDES: &[&str] = &["Mac and Cheese", "Collard Greens", "Cornbread", "Potato Salad", "Baked Beans"];
const DESSERTS: &[&str] = &["Peach Cobbler", "Banana Pudding", "Pecan Pie"];
const DRINKS: &[&str] = &["Sweet Tea", "Lemonade", "Coffee"];
const ADD_ONS: &[&str] = &["Linens", "Chafing Dishes", "Dessert Station"];

const CUSTOMERS: &[(&str, &str, Option<&str>)] = &[
    ("Jordan Reyes", "jordan@acme-events.com", Some("Acme Events")),
    ("Sam Patel", "sam.patel@gmail.com", None),
    ("Alex Kim", "procurement@parks.state.ga.us", Some("State Parks")),
    ("Morgan Lee", "morgan@riverside.org", Some("Riverside Church")),
    ("Taylor Brooks", "tbrooks@county.gov", Some("County Office")),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 25;
    let mut db_path = String::from("./catering_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(25);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Catering Demo Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of quotes to generate (default: 25)");
                println!("  -d, --db <PATH>    Database file path (default: ./catering_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Catering Demo Data Generator");
    println!("==============================");
    println!("Database: {}", db_path);
    println!("Quotes:   {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.quotes().get_by_id(&demo_id("quote", 0)).await?.is_some() {
        println!("⚠ Demo data already present; skipping.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let book = PriceBook::default();
    let tax = TaxCalculationService::default();
    let start = std::time::Instant::now();
    let mut change_requests = 0;

    for seed in 0..count {
        let quote = demo_quote(seed);
        db.quotes().insert(&quote).await?;

        let items = generate_line_items(&quote, &book);
        db.quotes().replace_line_items(&quote.id, &items).await?;

        let invoice = demo_invoice(&db, &quote, seed).await?;
        let totals = db.invoices().create_with_items(&invoice, &items, &tax).await?;

        if seed % 3 == 0 {
            db.change_requests()
                .insert(&demo_change_request(&invoice, seed))
                .await?;
            change_requests += 1;
        }

        println!(
            "  {} {:<28} {:>4} guests  {}",
            invoice.invoice_number, quote.event_name, quote.guest_count, totals.total
        );
    }

    println!();
    println!(
        "✓ Generated {} quotes and {} change requests in {:?}",
        count,
        change_requests,
        start.elapsed()
    );

    Ok(())
}

fn demo_id(kind: &str, seed: usize) -> String {
    format!("demo-{}-{:04}", kind, seed)
}

fn pick<'a>(options: &[&'a str], seed: usize, n: usize) -> Vec<String> {
    (0..n)
        .map(|k| options[(seed + k * 2) % options.len()].to_string())
        .collect()
}

fn demo_quote(seed: usize) -> QuoteRequest {
    let now = Utc::now();
    let (contact, email, company) = CUSTOMERS[seed % CUSTOMERS.len()];
    let service_type = match seed % 3 {
        0 => ServiceType::Buffet,
        1 => ServiceType::DropOff,
        _ => ServiceType::FullService,
    };

    QuoteRequest {
        id: demo_id("quote", seed),
        contact_name: contact.to_string(),
        email: Some(email.to_string()),
        phone: Some(format!("555-{:04}", seed)),
        company_name: company.map(str::to_string),
        event_name: format!("{} Event #{}", company.unwrap_or("Family"), seed + 1),
        event_date: (now + Duration::weeks(3 + (seed % 18) as i64)).date_naive(),
        guest_count: 20 + ((seed * 37) % 281) as i64,
        location: format!("{} Main Street", 100 + seed),
        service_type,
        menu: MenuSelections {
            proteins: pick(PROTEINS, seed, 2),
            sides: pick(SIDES, seed, 2),
            desserts: pick(DESSERTS, seed, 1),
            drinks: pick(DRINKS, seed, 1),
            add_ons: if seed % 4 == 0 { pick(ADD_ONS, seed, 1) } else { Vec::new() },
        },
        status: QuoteStatus::Quoted,
        workflow_status: QuoteWorkflowStatus::Sent,
        version: 1,
        estimated_total_cents: None,
        last_status_change: now,
        created_at: now,
        updated_at: now,
    }
}

async fn demo_invoice(
    db: &Database,
    quote: &QuoteRequest,
    seed: usize,
) -> Result<Invoice, Box<dyn std::error::Error>> {
    let now = Utc::now();
    Ok(Invoice {
        id: demo_id("invoice", seed),
        quote_request_id: quote.id.clone(),
        invoice_number: db.invoices().next_invoice_number(now).await?,
        status: InvoiceStatus::Sent,
        workflow_status: InvoiceStatus::Sent,
        subtotal_cents: 0,
        discount: None,
        discount_cents: 0,
        tax_amount_cents: 0,
        total_amount_cents: 0,
        manual_overrides: ManualOverrides::default(),
        customer_access_token: Some(Uuid::new_v4().simple().to_string()),
        token_expires_at: Some(now + Duration::days(DEFAULT_TOKEN_TTL_DAYS)),
        created_at: now,
        updated_at: now,
    })
}

fn demo_change_request(invoice: &Invoice, seed: usize) -> ChangeRequest {
    let add = PROTEINS[(seed + 3) % PROTEINS.len()].to_string();
    ChangeRequest {
        id: demo_id("change", seed),
        invoice_id: invoice.id.clone(),
        requested_changes: RequestedChanges {
            guest_count: Some(30 + (seed as i64 % 50) * 5),
            menu_changes: Some(MenuChanges {
                proteins: Some(CategoryChange {
                    add: vec![add],
                    remove: Vec::new(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        customer_comments: Some("A few more guests confirmed.".to_string()),
        status: ChangeRequestStatus::Pending,
        admin_response: None,
        estimated_cost_change_cents: None,
        resolved_by: None,
        created_at: Utc::now(),
        resolved_at: None,
    }
}
