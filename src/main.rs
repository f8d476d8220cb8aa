//! 权限中心启动入口
//! 加载配置、初始化日志、连接数据库、按需创建表结构并输出概要

use authority::{config::AppConfig, db, global, telemetry, AuthorityService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("authority {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    // 按优先级加载：.env.local > .env
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Authority starting...");

    // 3. 数据库连接池
    let pool = db::create_pool(&config.database).await?;
    let health = db::health_check(&pool).await;
    if !health.is_healthy() {
        anyhow::bail!("Database unhealthy: {:?}", health);
    }
    db::record_pool_metrics(&pool);

    // 4. 构建服务（migrate = true 时创建表结构）
    let service = AuthorityService::connect(pool, &config.store).await?;
    if global::install(service.clone()).is_err() {
        tracing::warn!("Authority service already installed");
    }

    let roles = service.fetch_all_roles().await?;
    let permissions = service.fetch_all_permissions().await?;

    let summary = serde_json::json!({
        "backend": service.backend_name(),
        "table_prefix": config.store.table_prefix,
        "roles": roles.iter().map(|r| &r.name).collect::<Vec<_>>(),
        "permissions": permissions.iter().map(|p| &p.name).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    tracing::info!(
        roles = roles.len(),
        permissions = permissions.len(),
        "Authority ready"
    );

    Ok(())
}

fn print_help() {
    println!(
        r#"authority {}

Usage: authority [--version | --help]

Environment:
  AUTHORITY_DATABASE__URL         PostgreSQL connection URL (required)
  AUTHORITY_STORE__TABLE_PREFIX   Table name prefix (default: "")
  AUTHORITY_STORE__MIGRATE        Create/update tables at startup (default: false)
  AUTHORITY_LOGGING__LEVEL        trace | debug | info | warn | error (default: info)
  AUTHORITY_LOGGING__FORMAT       json | pretty (default: json)
"#,
        env!("CARGO_PKG_VERSION")
    );
}
