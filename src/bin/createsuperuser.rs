use bcrypt::{hash, DEFAULT_COST};
use buzai::config::AppConfig;
use buzai::db;
use buzai::models::subscription::SubscriptionStatus;
use std::io::{self, Write};

fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🛡️  BuzAI - Create Superuser");
    println!("==========================================");

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Also applies pending migrations, so this works on a fresh database
    let pool = db::create_pool(&config).await?;

    let email = prompt("Email address: ")?.to_lowercase();
    if email.is_empty() || !email.contains('@') {
        eprintln!("❌ Invalid email address");
        return Ok(());
    }

    let existing_id = sqlx::query_scalar::<_, i32>("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&pool)
        .await?;

    if let Some(id) = existing_id {
        let answer = prompt("User already exists. Grant staff and superuser access? [y/N]: ")?;
        if !answer.eq_ignore_ascii_case("y") {
            println!("Nothing changed.");
            return Ok(());
        }

        sqlx::query("UPDATE users SET is_staff = true, is_superuser = true, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&pool)
            .await?;

        println!("✅ {} (ID {}) is now a superuser", email, id);
        pool.close().await;
        return Ok(());
    }

    print!("Password: ");
    io::stdout().flush()?;
    let password = rpassword::read_password()?;

    if password.chars().count() < 6 {
        eprintln!("❌ Password must be at least 6 characters long");
        return Ok(());
    }

    print!("Password (again): ");
    io::stdout().flush()?;
    let password_confirm = rpassword::read_password()?;

    if password != password_confirm {
        eprintln!("❌ Passwords don't match");
        return Ok(());
    }

    let password_hash = hash(&password, DEFAULT_COST)?;

    let result = sqlx::query_scalar::<_, i32>(
        "INSERT INTO users (email, password_hash, is_active, is_superuser, is_staff, status, created_at, updated_at)
         VALUES ($1, $2, true, true, true, $3, NOW(), NOW())
         RETURNING id",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(SubscriptionStatus::None.as_str())
    .fetch_one(&pool)
    .await;

    match result {
        Ok(id) => {
            println!();
            println!("✅ Superuser created successfully!");
            println!("   ID: {}", id);
            println!("   Email: {}", email);
            println!("   Staff: YES");
            println!("   Superuser: YES");
            println!();
            println!("🔐 Log in through /api/auth/login to review payments under /api/admin/*");
        }
        Err(e) => {
            eprintln!("❌ Failed to create superuser: {}", e);
        }
    }

    pool.close().await;
    Ok(())
}
