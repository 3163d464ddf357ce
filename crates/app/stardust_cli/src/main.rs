//! Stardust marketplace command-line client.
//!
//! Sessions persist in a JSON file between invocations. Logs go to stderr;
//! stdout carries command output only.

// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use cli::{AdsArgs, Cli, Commands, PostAdArgs};
use stardust_core::config::ClientConfig;
use stardust_core::context::ClientContext;
use stardust_core::filters::{FilterKey, FilterQuerySync};
use stardust_core::hierarchy::{HierarchyNode, HierarchySelector};
use stardust_core::models::{AdFields, AdPage, MediaFile, NewAd, Registration};
use stardust_core::session::{AuthOutcome, SessionStatus};
use stardust_core::store::FileTokenStore;
use stardust_core::transport::HttpTransport;
use tracing::{debug, error};

mod cli;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,stardust_core=debug")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> Result<()> {
    if let Commands::Version = args.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let ctx = connect(&args)?;
    match args.command {
        Commands::Version => {}
        Commands::Login {
            identifier,
            password,
        } => {
            let outcome = ctx.session.login(&identifier, &password).await?;
            report(outcome)?;
            if let Some(user) = ctx.session.user() {
                println!("Signed in as {}", user.display_name());
            }
        }
        Commands::Logout => {
            ctx.session.logout().await?;
            println!("Signed out");
        }
        Commands::Whoami => match ctx.session.check_status().await? {
            SessionStatus::Authenticated => {
                if let Some(user) = ctx.session.user() {
                    println!("{}", user.display_name());
                    if let Some(email) = &user.email {
                        println!("  email: {email} (verified: {})", user.email_verified);
                    }
                    if let Some(phone) = &user.phone_number {
                        println!("  phone: {phone} (verified: {})", user.phone_verified);
                    }
                }
            }
            _ => println!("Not signed in"),
        },
        Commands::Register {
            full_name,
            email,
            phone,
            password,
        } => {
            let outcome = ctx
                .session
                .register(&Registration {
                    email,
                    phone_number: phone,
                    full_name,
                    password,
                })
                .await?;
            report(outcome)?;
        }
        Commands::Categories => print_tree(&ctx.api.categories().await?, 0),
        Commands::Locations => print_tree(&ctx.api.locations().await?, 0),
        Commands::Ads(ads) => list_ads(&ctx, ads).await?,
        Commands::PostAd(ad) => post_ad(&ctx, ad).await?,
        Commands::DeleteAd { id } => {
            require_session(&ctx).await?;
            ctx.api.delete_ad(id).await?;
            println!("Deleted ad {id}");
        }
    }
    Ok(())
}

fn connect(args: &Cli) -> Result<ClientContext> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = &args.api_url {
        config = config.with_base_url(url.clone());
    }
    if let Some(path) = &args.token_file {
        config.token_file = path.clone();
    }
    debug!(base_url = %config.base_url, token_file = %config.token_file.display(), "client configured");

    let transport = Arc::new(HttpTransport::new(&config)?);
    let store = Arc::new(FileTokenStore::new(config.token_file.clone()));
    Ok(ClientContext::new(config, transport, store)?)
}

/// Print the outcome message; refusals become errors.
fn report(outcome: AuthOutcome) -> Result<()> {
    match outcome {
        AuthOutcome::Success { message } => {
            if let Some(message) = message {
                println!("{message}");
            }
            Ok(())
        }
        AuthOutcome::Rejected { message, .. } => Err(Error::Custom(message)),
        AuthOutcome::NetworkFailure { message } => {
            Err(Error::Custom(format!("Network error: {message}")))
        }
    }
}

async fn require_session(ctx: &ClientContext) -> Result<()> {
    match ctx.session.check_status().await? {
        SessionStatus::Authenticated => Ok(()),
        _ => Err(Error::Custom("Not signed in; run `stardust login` first".into())),
    }
}

async fn list_ads(ctx: &ClientContext, args: AdsArgs) -> Result<()> {
    if args.mine {
        require_session(ctx).await?;
        print_page(&ctx.api.user_ads().await?);
        return Ok(());
    }

    let page_size = ctx.config.page_size;
    let mut sync = match &args.query {
        Some(query) => FilterQuerySync::from_query(query, page_size),
        None => FilterQuerySync::new(page_size),
    };
    let flags = [
        (FilterKey::Search, &args.search),
        (FilterKey::Category, &args.category),
        (FilterKey::Subcategory, &args.subcategory),
        (FilterKey::MinPrice, &args.min_price),
        (FilterKey::MaxPrice, &args.max_price),
        (FilterKey::Location, &args.location),
        (FilterKey::AdType, &args.ad_type),
    ];
    for (key, value) in flags {
        if let Some(value) = value {
            sync.set_filter(key, Some(value.as_str()));
        }
    }
    if let Some(offset) = args.offset {
        sync.set_offset(offset)?;
    }
    debug!(query = %sync.query_string(), "listing ads");

    let page = ctx.api.list_ads(sync.state()).await?;
    sync.record_page(page.pagination);
    print_page(&page);
    Ok(())
}

async fn post_ad(ctx: &ClientContext, args: PostAdArgs) -> Result<()> {
    require_session(ctx).await?;

    let mut category = HierarchySelector::two_level();
    category.load_tree(ctx.api.categories().await?);
    category.select_parent(Some(args.category));
    category.select_child(args.subcategory)?;

    let mut location = HierarchySelector::three_level();
    location.load_tree(ctx.api.locations().await?);
    location.select_parent(Some(args.country));
    location.select_child(args.province)?;
    location.select_grandchild(args.city)?;

    let fields = AdFields {
        title: args.title,
        description: args.description,
        price: args.price,
        currency_code: args.currency,
        ad_type: args.ad_type,
        ..AdFields::default()
    };
    let ad = NewAd::from_selections(fields, &category, &location)?;
    let created = ctx.api.create_ad(&ad).await?;
    let id = created["id"]
        .as_u64()
        .ok_or_else(|| Error::Custom("Server did not return the new ad id".into()))?;
    println!("Posted ad {id}");

    if !args.images.is_empty() {
        let files = args
            .images
            .iter()
            .map(|path| read_media(path.as_path()))
            .collect::<Result<Vec<_>>>()?;
        ctx.api.upload_media(id, &files).await?;
        println!("Attached {} image(s)", files.len());
    }
    Ok(())
}

fn read_media(path: &Path) -> Result<MediaFile> {
    let bytes = std::fs::read(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let content_type = match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(MediaFile {
        file_name,
        content_type: content_type.to_string(),
        bytes,
    })
}

fn print_tree(nodes: &[HierarchyNode], depth: usize) {
    for node in nodes {
        println!("{:indent$}{:>4}  {}", "", node.id, node.name, indent = depth * 2);
        print_tree(&node.children, depth + 1);
    }
}

fn print_page(page: &AdPage) {
    if page.data.is_empty() {
        println!("No ads found");
        return;
    }
    for ad in &page.data {
        println!(
            "{:>6}  {:<40}  {:>12}  {}",
            ad.id,
            ad.title,
            ad.price.as_deref().unwrap_or("-"),
            ad.location.as_deref().unwrap_or("")
        );
    }
    let p = page.pagination;
    let first = p.offset + 1;
    let last = p.offset + page.data.len() as u64;
    println!("{first}-{last} of {}", p.total);
}
