use clap::Subcommand;
use croprec_core::session::Role;
use serde_json::json;

use crate::util::{exit_error, pretty};

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Create a user that can sign in (requires DATABASE_URL)
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long, env = "CROPREC_NEW_USER_PASSWORD")]
        password: String,
        /// "user" or "admin"; admins may run preview predictions
        #[arg(long, default_value = "user", value_parser = ["user", "admin"])]
        role: String,
    },
}

pub async fn run(command: AdminCommands) -> i32 {
    match command {
        AdminCommands::CreateUser {
            username,
            password,
            role,
        } => create_user(&username, &password, Role::parse(&role)).await,
    }
}

async fn create_user(username: &str, password: &str, role: Role) -> i32 {
    let username = username.trim();
    if username.is_empty() {
        exit_error("username must not be empty", None);
    }
    if password.len() < 8 {
        exit_error("password must be at least 8 characters", None);
    }

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => exit_error(
            "DATABASE_URL must be set for admin commands",
            Some("Admin commands connect directly to the database for bootstrapping"),
        ),
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
    {
        Ok(p) => p,
        Err(e) => exit_error(&format!("Failed to connect to database: {e}"), None),
    };

    let password_hash = match croprec_core::auth::hash_password(password) {
        Ok(h) => h,
        Err(e) => exit_error(&format!("Failed to hash password: {e}"), None),
    };

    let user_id = uuid::Uuid::now_v7();

    if let Err(e) = sqlx::query(
        "INSERT INTO users (id, username, password_hash, role) VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(username)
    .bind(&password_hash)
    .bind(role.as_str())
    .execute(&pool)
    .await
    {
        exit_error(&format!("Failed to create user: {e}"), None);
    }

    let output = json!({
        "user_id": user_id,
        "username": username,
        "role": role.as_str()
    });
    println!("{}", pretty(&output));
    0
}
