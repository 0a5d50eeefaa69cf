use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upload_intake::infrastructure::database;
use upload_intake::services::secret_admin::SecretAdmin;

#[derive(Parser, Debug)]
#[command(author, version, about = "Manage upload credentials and method mappings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a credential and print its generated secret key
    CreateSecret {
        username: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// List all credentials
    ListSecrets,
    /// Delete a credential and its grants
    DeleteSecret { id: String },
    /// Register a method mapping
    AddMethod {
        method: String,
        uri: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Mandatory CSV headers, in order
        #[arg(long, value_delimiter = ',')]
        headers: Vec<String>,
    },
    /// List all method mappings
    ListMethods,
    /// Allow a credential to use a method mapping
    Grant {
        username: String,
        method_mapping_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intake_admin=info,upload_intake=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("🔌 Connecting to database...");
    let db = database::setup_database().await?;
    let admin = SecretAdmin::new(db);

    let outcome = match cli.command {
        Command::CreateSecret { username, email } => admin
            .create_secret(&username, email.as_deref())
            .await
            .map(|secret| {
                println!("id:         {}", secret.id);
                println!("username:   {}", secret.username);
                println!("secret_key: {}", secret.secret_key);
            }),
        Command::ListSecrets => admin.list_secrets().await.map(|secrets| {
            for secret in secrets {
                println!(
                    "{}\t{}\t{}",
                    secret.id,
                    secret.username,
                    secret.email.unwrap_or_default()
                );
            }
        }),
        Command::DeleteSecret { id } => admin
            .delete_secret(&id)
            .await
            .map(|secret| println!("Deleted '{}'", secret.username)),
        Command::AddMethod {
            method,
            uri,
            description,
            headers,
        } => {
            let headers: Vec<String> = headers
                .into_iter()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
            admin
                .create_method(&method, &uri, &description, &headers)
                .await
                .map(|mapping| println!("{}\t{}\t{}", mapping.id, mapping.method, mapping.uri))
        }
        Command::ListMethods => admin.list_methods().await.map(|mappings| {
            for mapping in mappings {
                println!(
                    "{}\t{}\t{}\t[{}]",
                    mapping.id, mapping.method, mapping.uri, mapping.mandatory_headers
                );
            }
        }),
        Command::Grant {
            username,
            method_mapping_id,
        } => admin
            .grant_method(&username, &method_mapping_id)
            .await
            .map(|()| println!("Granted {} to '{}'", method_mapping_id, username)),
    };

    if let Err(e) = outcome {
        error!("❌ {}", e);
        std::process::exit(1);
    }

    Ok(())
}
