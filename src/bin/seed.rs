use chrono::{Duration, Utc};
use mindhaven::{
    domain::{CreateUserRequest, NewTherapySession, SessionStatus},
    repository::{
        SqliteTherapySessionRepository, SqliteUserRepository, TherapySessionRepository,
        UserRepository,
    },
};
use sqlx::sqlite::SqlitePoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    println!("🌱 Starting database seeding...");

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://mindhaven.db?mode=rwc".to_string());

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let user_repo = SqliteUserRepository::new(db_pool.clone());
    let session_repo = SqliteTherapySessionRepository::new(db_pool.clone());

    let patient = match user_repo.find_by_email("patient@mindhaven.local").await? {
        Some(existing) => {
            println!("  ↪ Demo patient already exists");
            existing
        }
        None => {
            let created = user_repo.create(CreateUserRequest {
                email: "patient@mindhaven.local".to_string(),
                full_name: "Maria Souza".to_string(),
                password: "password123".to_string(),
            }).await?;
            println!("  ✅ Created demo patient (patient@mindhaven.local / password123)");
            created
        }
    };

    let existing = session_repo.list_by_patient(patient.id).await?;
    if !existing.is_empty() {
        println!("  ↪ {} sessions already scheduled, nothing to do", existing.len());
        return Ok(());
    }

    println!("🗓️  Scheduling sessions...");
    let upcoming = [
        ("Dr. Ana Lima", 2, SessionStatus::PendingPayment),
        ("Dr. Ana Lima", 9, SessionStatus::PendingPayment),
        ("Dr. Paulo Reis", 16, SessionStatus::Scheduled),
    ];

    for (therapist, days_ahead, status) in upcoming {
        let session = session_repo.create(NewTherapySession {
            patient_id: patient.id,
            therapist_name: Some(therapist.to_string()),
            scheduled_at: Utc::now() + Duration::days(days_ahead),
            duration_minutes: 50,
            status,
        }).await?;
        println!("  ✅ Session #{} with {} ({:?})", session.id, therapist, session.status);
    }

    println!("🎉 Seeding complete!");
    Ok(())
}
