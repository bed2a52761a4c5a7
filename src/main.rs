use clap::Parser;
use medguard::cli::{Cli, Commands, MedAction, UserAction};
use medguard::medication::{NewMedication, Status};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Keygen => medguard::cli::commands::keygen::execute(),
        Commands::Run => medguard::cli::commands::run::execute(&cli),
        Commands::Reconcile { ref at } => {
            medguard::cli::commands::reconcile::execute(&cli, at.as_deref())
        }
        Commands::Med { ref action } => match action {
            MedAction::Add {
                user,
                name,
                dosage,
                frequency,
                time,
                instructions,
                refill_date,
                low_supply,
                notify,
                status,
            } => status.parse::<Status>().and_then(|status| {
                let new = NewMedication {
                    name: name.clone(),
                    dosage: dosage.clone(),
                    frequency: frequency.clone(),
                    time: time.clone(),
                    instructions: instructions.clone(),
                    status,
                    refill_date: refill_date.clone(),
                    low_supply: *low_supply,
                    notification: *notify,
                };
                medguard::cli::commands::med::execute_add(&cli, user, &new)
            }),
            MedAction::List { user, status } => {
                medguard::cli::commands::med::execute_list(&cli, user, status.as_deref())
            }
            MedAction::Show { id } => medguard::cli::commands::med::execute_show(&cli, id),
            MedAction::Take { user, id } => {
                medguard::cli::commands::med::execute_take(&cli, user, id)
            }
            MedAction::Purge { user, force } => {
                medguard::cli::commands::med::execute_purge(&cli, user, *force)
            }
        },
        Commands::User { ref action } => match action {
            UserAction::Add {
                id,
                name,
                role,
                fcm_token,
                profile_json,
            } => medguard::cli::commands::user::execute_add(
                &cli,
                id,
                name,
                role,
                fcm_token.as_deref(),
                profile_json.as_deref(),
            ),
            UserAction::Show { id } => medguard::cli::commands::user::execute_show(&cli, id),
            UserAction::Assign { caregiver, patient } => {
                medguard::cli::commands::user::execute_assign(&cli, caregiver, patient)
            }
        },
        Commands::Notifications { last, ref patient } => {
            medguard::cli::commands::notifications::execute(&cli, last, patient.as_deref())
        }
        Commands::Completions { ref shell } => medguard::cli::commands::completions::execute(shell),
    };

    if let Err(e) = result {
        medguard::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
