//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run UI.
//! No business logic here; sign-in is delegated to AuthService.

use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tutor_crm::adapters::clock::SystemClock;
use tutor_crm::adapters::persistence::{FilePhoneCodeLog, SqliteRepo};
use tutor_crm::adapters::ui::tui::TuiInputPort;
use tutor_crm::ports::{
    AccountPort, BillingPort, Clock, InputPort, LessonPort, PhoneCodeLogPort, RosterPort,
};
use tutor_crm::shared::config::AppConfig;
use tutor_crm::usecases::{
    AuthService, BillingService, DashboardService, EnrollmentService, LessonService,
    RosterService, ScheduleService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (check CWD)"),
    }

    tutor_crm::adapters::ui::init_ui();

    let cfg = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "config could not be loaded, using defaults");
            AppConfig::default()
        }
    };

    let data_path = cfg.data_dir_or_default();
    let data_dir_abs = data_path
        .canonicalize()
        .unwrap_or_else(|_| data_path.clone());
    info!(path = %data_dir_abs.display(), "data directory");

    let sqlite_repo = Arc::new(
        SqliteRepo::connect(&data_path)
            .await
            .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?,
    );
    let roster: Arc<dyn RosterPort> = Arc::clone(&sqlite_repo) as Arc<dyn RosterPort>;
    let lessons: Arc<dyn LessonPort> = Arc::clone(&sqlite_repo) as Arc<dyn LessonPort>;
    let billing_port: Arc<dyn BillingPort> = Arc::clone(&sqlite_repo) as Arc<dyn BillingPort>;
    let accounts: Arc<dyn AccountPort> = Arc::clone(&sqlite_repo) as Arc<dyn AccountPort>;

    let codes_path = cfg.verification_codes_file_or_default();
    info!(path = %codes_path.display(), "verification codes are appended here");
    let code_log: Arc<dyn PhoneCodeLogPort> = Arc::new(FilePhoneCodeLog::new(&codes_path));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // --- Services ---
    let auth = Arc::new(AuthService::new(
        Arc::clone(&accounts),
        code_log,
        Arc::clone(&clock),
        cfg.phone_code_ttl_secs_or_default(),
    ));
    let billing = Arc::new(BillingService::new(
        billing_port,
        Arc::clone(&roster),
        Arc::clone(&clock),
    ));
    let roster_service = Arc::new(RosterService::new(
        Arc::clone(&roster),
        Arc::clone(&accounts),
        Arc::clone(&lessons),
        Arc::clone(&billing),
        Arc::clone(&clock),
    ));
    let enrollments = Arc::new(EnrollmentService::new(Arc::clone(&roster)));
    let lesson_service = Arc::new(LessonService::new(
        Arc::clone(&roster),
        Arc::clone(&lessons),
        Arc::clone(&billing),
    ));
    let schedule = Arc::new(ScheduleService::new(
        Arc::clone(&roster),
        Arc::clone(&lessons),
        Arc::clone(&clock),
        cfg.lesson_weeks_ahead_or_default(),
    ));
    let dashboard = Arc::new(DashboardService::new(
        Arc::clone(&roster),
        Arc::clone(&lessons),
        Arc::clone(&billing),
        Arc::clone(&roster_service),
    ));

    // --- Bootstrap admin ---
    if let Some(phone) = cfg.admin_phone() {
        let admin = auth
            .ensure_admin(phone)
            .await
            .map_err(|e| anyhow::anyhow!("admin bootstrap failed: {}", e))?;
        info!(account_id = admin.id, "administrator account ready");
    } else {
        warn!("CRM_ADMIN_PHONE is not set; no administrator is bootstrapped");
    }

    let input_port: Arc<dyn InputPort> = Arc::new(TuiInputPort::new(
        auth,
        roster_service,
        enrollments,
        lesson_service,
        schedule,
        billing,
        dashboard,
        clock,
    ));

    input_port
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
