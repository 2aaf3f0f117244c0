use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use shared::domain::{ImageId, ScreenSize, GROUP_COUNT};
use storage::{DocumentStore, Storage};
use survey_core::{
    http::{
        EmailCredentials, HttpAnalytics, HttpGeoLocator, HttpIpLookup, HttpMailer,
        RestDocumentStore,
    },
    parse_resume_id,
    services::{
        Analytics, FixedIpLookup, GeoLocator, IpLookup, Mailer, MissingAnalytics,
        MissingGeoLocator, MissingMailer,
    },
    ImageCatalog, ResumeLinks, Screen, SurveyClient, SurveyDependencies, Transition,
};
use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url, Settings};

const SYNTHETIC_IMAGES_PER_GROUP: usize = 8;
const OFFLINE_IP: &str = "127.0.0.1";

const AID_CHOICES: &[&str] = &[
    "Manual wheelchair",
    "Power wheelchair",
    "Mobility scooter",
    "Walker",
    "Cane",
];

const RANK_ITEMS: &[&str] = &[
    "Curb ramps",
    "Surface condition",
    "Slope",
    "Sidewalk width",
    "Obstructions",
];

#[derive(Parser, Debug)]
struct Cli {
    /// Configuration file; defaults to ./survey.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new survey session.
    Take,
    /// Pick up a saved session from its link or document id.
    Resume { link: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref());

    let resume_id = match cli.command.unwrap_or(Command::Take) {
        Command::Take => None,
        Command::Resume { link } => Some(
            parse_resume_id(&link).ok_or_else(|| anyhow!("'{link}' is not a resumption link"))?,
        ),
    };

    let mut client = SurveyClient::new(build_dependencies(&settings).await?);
    client.load(resume_id).await?;

    let mut terminal = Terminal::new();
    let outcome = run_wizard(&mut client, &mut terminal).await;
    client.flush().await;
    outcome
}

async fn build_store(settings: &Settings) -> Result<Arc<dyn DocumentStore>> {
    if settings.uses_rest_store() {
        info!(store_url = %settings.store_url, collection = %settings.collection_name, "using remote document store");
        return Ok(Arc::new(RestDocumentStore::new(
            settings.store_url.clone(),
            settings.collection_name.clone(),
        )));
    }

    let database_url = prepare_database_url(&settings.store_url)?;
    info!(database_url = %database_url, "using sqlite document store");
    Ok(Arc::new(Storage::new(&database_url).await?))
}

async fn build_dependencies(settings: &Settings) -> Result<SurveyDependencies> {
    let store = build_store(settings).await?;

    let ip_lookup: Arc<dyn IpLookup> = match &settings.ip_lookup_url {
        Some(url) => Arc::new(HttpIpLookup::new(url.clone())),
        None => {
            warn!("no ip lookup endpoint configured; recording {OFFLINE_IP}");
            Arc::new(FixedIpLookup(OFFLINE_IP.to_string()))
        }
    };

    let geo_locator: Arc<dyn GeoLocator> = match &settings.geo_lookup_url {
        Some(url) => Arc::new(HttpGeoLocator::new(url.clone())),
        None => Arc::new(MissingGeoLocator),
    };

    let mailer: Arc<dyn Mailer> = match (
        &settings.email_endpoint,
        &settings.email_service_id,
        &settings.email_template_id,
        &settings.email_user_id,
    ) {
        (Some(endpoint), Some(service_id), Some(template_id), Some(user_id)) => {
            Arc::new(HttpMailer::new(
                endpoint.clone(),
                EmailCredentials {
                    service_id: service_id.clone(),
                    template_id: template_id.clone(),
                    user_id: user_id.clone(),
                },
            ))
        }
        _ => Arc::new(MissingMailer),
    };

    let analytics: Arc<dyn Analytics> = match &settings.analytics_url {
        Some(url) => Arc::new(HttpAnalytics::new(url.clone())),
        None => Arc::new(MissingAnalytics),
    };

    let catalog = match &settings.catalog_path {
        Some(path) => ImageCatalog::load(path)?,
        None => ImageCatalog::synthetic(SYNTHETIC_IMAGES_PER_GROUP),
    };

    let screen_size = match (settings.screen_width, settings.screen_height) {
        (Some(width), Some(height)) => Some(ScreenSize { width, height }),
        _ => None,
    };

    Ok(SurveyDependencies {
        store,
        ip_lookup,
        geo_locator,
        mailer,
        analytics,
        catalog,
        links: ResumeLinks::new(&settings.public_base_url)?,
        screen_size,
    })
}

struct Terminal {
    lines: Lines<BufReader<Stdin>>,
}

enum Input {
    Text(String),
    Back,
    Quit,
}

impl Terminal {
    fn new() -> Self {
        Self {
            lines: BufReader::new(stdin()).lines(),
        }
    }

    async fn ask(&mut self, prompt: &str) -> Result<Input> {
        println!("{prompt}");
        let Some(line) = self.lines.next_line().await? else {
            return Ok(Input::Quit);
        };
        let line = line.trim().to_string();
        Ok(match line.as_str() {
            ":back" => Input::Back,
            ":quit" => Input::Quit,
            _ => Input::Text(line),
        })
    }
}

fn parse_picks(raw: &str, max: usize) -> Option<Vec<usize>> {
    raw.split([',', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .ok()
                .filter(|n| (1..=max).contains(n))
                .map(|n| n - 1)
        })
        .collect()
}

fn list<T: std::fmt::Display>(items: &[T]) {
    for (i, item) in items.iter().enumerate() {
        println!("  {}. {item}", i + 1);
    }
}

fn report(transition: Transition, client: &SurveyClient) {
    if let Transition::Rejected = transition {
        for (_, message) in client.controller().errors().iter() {
            println!("! {message}");
        }
    }
}

fn alert(err: impl std::fmt::Display) {
    println!("! Something went wrong ({err}). Please try again.");
}

async fn run_wizard(client: &mut SurveyClient, terminal: &mut Terminal) -> Result<()> {
    println!("Type :back to go to the previous question or :quit to leave.");
    if client.controller().show_mobile_warning() {
        println!("This survey works best on a larger screen.");
    }

    loop {
        if client.controller().show_break_overlay() {
            let done = client.controller().completed_blocks();
            let prompt = format!(
                "You have finished {done} of {GROUP_COUNT} image groups. Press enter to keep going, or type 'later' to save and come back."
            );
            match terminal.ask(&prompt).await? {
                Input::Text(answer) if answer.eq_ignore_ascii_case("later") => {
                    match client.save_for_later().await {
                        Ok(url) => {
                            println!("Your progress is saved. Continue at: {url}");
                            offer_email(client, terminal).await?;
                            return Ok(());
                        }
                        Err(err) => alert(err),
                    }
                }
                Input::Quit => return leave(client).await,
                _ => client.dismiss_break_overlay(),
            }
            continue;
        }

        let screen = client.screen();
        let prompt = prompt_for(client, screen);
        let input = match terminal.ask(&prompt).await? {
            Input::Quit => return leave(client).await,
            Input::Back => {
                client.previous_step();
                continue;
            }
            Input::Text(text) => text,
        };

        match screen {
            Screen::Welcome => client.start().await,
            Screen::Intro | Screen::InstructionsOne | Screen::InstructionsTwo => {
                report(client.next_step(), client)
            }
            Screen::Name => {
                client.set_name(input);
                report(client.next_step(), client);
            }
            Screen::Email => {
                client.set_email(input);
                report(client.next_step(), client);
            }
            Screen::MobilityAidOptions => {
                let picks = parse_picks(&input, AID_CHOICES.len()).unwrap_or_default();
                client.set_mobility_aid_options(
                    picks.into_iter().map(|i| AID_CHOICES[i].to_string()).collect(),
                );
                report(client.next_step(), client);
            }
            Screen::MobilityAidChoice => {
                let options = client.controller().answers().mobility_aid_options.clone();
                if let Some([pick]) = parse_picks(&input, options.len()).as_deref() {
                    if let Err(err) = client.choose_mobility_aid(options[*pick].clone()) {
                        alert(err);
                    }
                }
                report(client.next_step(), client);
            }
            Screen::SidewalkBarriers => {
                client.set_sidewalk_barriers(input);
                report(client.next_step(), client);
            }
            Screen::ImageSelection { .. } => {
                let offered = client.offered_images();
                let Some(picks) = parse_picks(&input, offered.len()) else {
                    println!("! Enter image numbers, e.g. 1,2 3,4");
                    continue;
                };
                let chosen: Vec<ImageId> = picks.iter().map(|i| offered[*i].clone()).collect();
                let (group_a, group_b) = chosen.split_at(chosen.len().min(2));
                if let Err(err) = client.complete_selection(group_a.to_vec(), group_b.to_vec()) {
                    alert(err);
                }
            }
            Screen::ImageComparison { .. } => {
                let offered = client.offered_images();
                match parse_picks(&input, offered.len()).as_deref() {
                    Some([pick]) => {
                        if let Err(err) = client.complete_comparison(offered[*pick].clone()) {
                            alert(err);
                        }
                    }
                    _ => println!("! Pick one image"),
                }
            }
            Screen::Rank => {
                if let Some(order) = parse_picks(&input, RANK_ITEMS.len()) {
                    if !order.is_empty() {
                        client.set_ranking(
                            order.into_iter().map(|i| RANK_ITEMS[i].to_string()).collect(),
                        );
                    }
                }
                report(client.next_step(), client);
            }
            Screen::Continue => continue_branch(client, terminal, &input).await?,
            Screen::Ending => {
                if !input.eq_ignore_ascii_case("submit") {
                    continue;
                }
                match client.submit().await {
                    Ok(id) => {
                        println!("Thank you! Your responses were saved (reference {id}).");
                        return Ok(());
                    }
                    Err(err) => alert(err),
                }
            }
        }
    }
}

fn prompt_for(client: &SurveyClient, screen: Screen) -> String {
    let controller = client.controller();
    let progress = controller.progress_percent();
    let header = format!("[{progress:>3.0}%]");
    match screen {
        Screen::Welcome => "Welcome to the sidewalk accessibility survey. Press enter to begin.".into(),
        Screen::Intro => format!("{header} We will ask about your mobility aids and show you street images. Press enter."),
        Screen::Name => format!("{header} What is your name?"),
        Screen::Email => format!("{header} What is your email address?"),
        Screen::MobilityAidOptions => {
            list(AID_CHOICES);
            format!("{header} Which mobility aids do you use? Enter all numbers that apply.")
        }
        Screen::MobilityAidChoice => {
            list(&controller.answers().mobility_aid_options);
            format!("{header} Which one would you like to answer for first?")
        }
        Screen::SidewalkBarriers => {
            let aid = controller.answers().mobility_aid.as_deref().unwrap_or("your mobility aid");
            format!("{header} Using a {aid}, what sidewalk barriers do you run into?")
        }
        Screen::InstructionsOne => format!("{header} You will now pick the images that look hardest to travel. Press enter."),
        Screen::InstructionsTwo => format!("{header} Then you will compare the images you picked. Press enter."),
        Screen::ImageSelection { block, group } => {
            list(&client.offered_images());
            format!(
                "{header} Image set {} of {GROUP_COUNT} ({group}). Enter two numbers for the hardest images, then two for the easiest.",
                block + 1
            )
        }
        Screen::ImageComparison { side, .. } => {
            list(&client.offered_images());
            format!("{header} Of these ({side}), which is harder to travel? Enter one number.")
        }
        Screen::Rank => {
            list(RANK_ITEMS);
            format!("{header} Rank these from most to least important, e.g. 3,1,2,5,4.")
        }
        Screen::Continue => {
            let current = controller.answers().mobility_aid.clone();
            let others: Vec<String> = controller
                .remaining_mobility_aids()
                .into_iter()
                .filter(|aid| Some(aid) != current.as_ref())
                .collect();
            list(&others);
            format!("{header} Answer for another aid now? Enter its number, or 'later' to get a link.")
        }
        Screen::Ending => match controller.continue_url() {
            Some(url) => format!("{header} Continue the remaining aids later at {url}. Type 'submit' to finish."),
            None => format!("{header} Type 'submit' to send your answers."),
        },
    }
}

async fn continue_branch(
    client: &mut SurveyClient,
    terminal: &mut Terminal,
    input: &str,
) -> Result<()> {
    if input.eq_ignore_ascii_case("later") {
        match client.continue_later().await {
            Ok(url) => {
                println!("Continue later at: {url}");
                offer_email(client, terminal).await?;
            }
            Err(err) => alert(err),
        }
        return Ok(());
    }

    let current = client.controller().answers().mobility_aid.clone();
    let others: Vec<String> = client
        .controller()
        .remaining_mobility_aids()
        .into_iter()
        .filter(|aid| Some(aid) != current.as_ref())
        .collect();
    match parse_picks(input, others.len()).as_deref() {
        Some([pick]) => {
            if let Err(err) = client.continue_with_aid(others[*pick].clone()).await {
                alert(err);
            }
        }
        _ => println!("! Enter one number or 'later'"),
    }
    Ok(())
}

async fn offer_email(client: &mut SurveyClient, terminal: &mut Terminal) -> Result<()> {
    if let Input::Text(answer) = terminal.ask("Email this link to yourself? (y/n)").await? {
        if answer.eq_ignore_ascii_case("y") {
            match client.email_resume_link().await {
                Ok(()) => println!("Email sent to {}.", client.controller().answers().email),
                Err(err) => alert(err),
            }
        }
    }
    Ok(())
}

async fn leave(client: &mut SurveyClient) -> Result<()> {
    client.exit_beacon().await;
    println!("Goodbye. Progress you made so far has been saved.");
    Ok(())
}
