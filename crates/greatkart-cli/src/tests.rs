use super::*;
use greatkart_core::OrderStatus;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["greatkart-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["greatkart-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn db_seed_path_is_optional() {
    let cli = Cli::try_parse_from(["greatkart-cli", "db", "seed"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Seed { path: None }
        })
    ));
}

#[test]
fn parses_db_seed_with_path() {
    let cli = Cli::try_parse_from([
        "greatkart-cli",
        "db",
        "seed",
        "--path",
        "config/catalog.yaml",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Seed { path: Some(ref p) }
        }) if p.ends_with("catalog.yaml")
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["greatkart-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_create_superuser() {
    let cli = Cli::try_parse_from([
        "greatkart-cli",
        "accounts",
        "create-superuser",
        "--username",
        "admin",
        "--email",
        "admin@example.com",
        "--password",
        "hunter22",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Accounts {
            command: AccountsCommands::CreateSuperuser {
                ref username,
                ref email,
                ref password,
            }
        }) if username == "admin" && email == "admin@example.com" && password == "hunter22"
    ));
}

#[test]
fn create_superuser_requires_email() {
    let result = Cli::try_parse_from([
        "greatkart-cli",
        "accounts",
        "create-superuser",
        "--username",
        "admin",
        "--password",
        "hunter22",
    ]);
    assert!(result.is_err());
}

#[test]
fn orders_list_defaults_limit() {
    let cli = Cli::try_parse_from(["greatkart-cli", "orders", "list"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Orders {
            command: OrdersCommands::List { limit: 20 }
        })
    ));
}

#[test]
fn parses_orders_set_status() {
    let cli = Cli::try_parse_from([
        "greatkart-cli",
        "orders",
        "set-status",
        "--order-number",
        "2026101842",
        "--status",
        "Completed",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::Orders {
            command: OrdersCommands::SetStatus {
                ref order_number,
                status: OrderStatus::Completed,
            }
        }) if order_number == "2026101842"
    ));
}

#[test]
fn set_status_rejects_unknown_status() {
    let result = Cli::try_parse_from([
        "greatkart-cli",
        "orders",
        "set-status",
        "--order-number",
        "2026101842",
        "--status",
        "Shipped",
    ]);
    assert!(result.is_err());
}

#[test]
fn parses_sessions_purge() {
    let cli = Cli::try_parse_from(["greatkart-cli", "sessions", "purge"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sessions {
            command: SessionsCommands::Purge
        })
    ));
}
