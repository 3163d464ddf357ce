use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "stardust", version, about = "Stardust marketplace client")]
pub struct Cli {
    /// Backend origin (overrides STARDUST_API_URL).
    #[arg(long, global = true)]
    pub api_url: Option<Url>,

    /// Session file (overrides STARDUST_TOKEN_FILE).
    #[arg(long, global = true)]
    pub token_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the version.
    Version,

    /// Sign in with an email address or E.164 phone number.
    Login {
        identifier: String,
        #[arg(long, env = "STARDUST_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the stored session.
    Logout,

    /// Show the signed-in user.
    Whoami,

    /// Create an account.
    Register {
        #[arg(long)]
        full_name: String,
        #[arg(long, required_unless_present = "phone")]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long, env = "STARDUST_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Print the category tree.
    Categories,

    /// Print the location tree.
    Locations,

    /// List ads.
    Ads(AdsArgs),

    /// Post a new ad.
    PostAd(PostAdArgs),

    /// Delete one of your ads.
    DeleteAd { id: u64 },
}

#[derive(Args, Debug)]
pub struct AdsArgs {
    /// Start from a page query string, e.g. "category=3&offset=20".
    #[arg(long)]
    pub query: Option<String>,

    #[arg(long)]
    pub search: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub subcategory: Option<String>,

    #[arg(long)]
    pub min_price: Option<String>,

    #[arg(long)]
    pub max_price: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    #[arg(long)]
    pub ad_type: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub offset: Option<i64>,

    /// List your own ads instead.
    #[arg(long, conflicts_with_all = ["query", "search", "category", "offset"])]
    pub mine: bool,
}

#[derive(Args, Debug)]
pub struct PostAdArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub description: String,

    #[arg(long)]
    pub price: String,

    #[arg(long, default_value = "CAD")]
    pub currency: String,

    #[arg(long, default_value = "sell")]
    pub ad_type: String,

    #[arg(long)]
    pub category: u64,

    #[arg(long)]
    pub subcategory: u64,

    #[arg(long)]
    pub country: u64,

    #[arg(long)]
    pub province: u64,

    #[arg(long)]
    pub city: u64,

    /// Image to attach; repeatable.
    #[arg(long = "image")]
    pub images: Vec<PathBuf>,
}
