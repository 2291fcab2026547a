use clap::Parser;
use fedauth::{
    managers::{IdentityManager, IdentityOptions},
    AccessToken, Client, Password, RequestOptions,
};
use fedauth_reqwest::ReqwestTransport;

#[derive(Debug, Parser)]
struct Opts {
    /// The portal's sharing URL
    #[arg(
        short,
        long,
        env,
        default_value = "https://www.arcgis.com/sharing/rest"
    )]
    portal: String,

    /// The user to sign in as
    #[arg(short, long, env)]
    username: String,

    /// The user's password
    #[arg(long, env, hide_env_values = true)]
    password: String,

    /// A service to fetch with the user's credentials
    #[arg(short, long, env)]
    service_url: Option<String>,

    /// Print the credentials as JSON after signing in
    #[arg(long)]
    print_snapshot: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let http = reqwest::Client::builder().https_only(true).build()?;
    let client = Client::new(ReqwestTransport::from(http));

    let manager = IdentityManager::sign_in(
        client.clone(),
        IdentityOptions {
            portal: Some(opts.portal),
            username: Some(opts.username),
            password: Some(Password::new(opts.password)),
            ..IdentityOptions::default()
        },
    )
    .await?;

    let username = manager.username().unwrap_or_default();
    let token = manager.token().unwrap_or_else(AccessToken::anonymous);
    tracing::info!(
        username = %username,
        token = %token,
        expires = ?manager.token_expires(),
        "signed in"
    );

    if let Some(url) = opts.service_url {
        let service = client
            .request_json(
                &url,
                RequestOptions::new().with_authentication(manager.clone()),
            )
            .await?;
        println!("{:#}", service);
    }

    if opts.print_snapshot {
        println!("{}", manager.serialize()?);
    }

    Ok(())
}
