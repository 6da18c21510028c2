// src/main.rs
use clap::{Parser, Subcommand};
use kubekit_pki::cluster::certs_dir_for;
use kubekit_pki::config::ClusterConfig;
use kubekit_pki::discovery::discover_certificates;
use kubekit_pki::tls::ServerTlsMaterial;
use kubekit_pki::utils::logging::{ConsoleLogger, FileLogger, Logger, MultiLogger};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "kubekit-pki", about = "Certificate authorities and certificates for KubeKit clusters")]
pub struct Args {
    #[arg(short, long, default_value = "cluster_config.json")]
    pub config: String,
    #[arg(short, long)]
    pub debug: bool,
    #[arg(long)]
    pub log_file: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load or generate every CA and certificate of the cluster.
    Generate {
        /// Regenerate CAs from a previous run; user supplied CA files are still used.
        #[arg(long)]
        force: bool,
    },
    /// Print a JSON inventory of the certificates on disk.
    Inspect {
        /// Directory to scan instead of the cluster's certificates directory.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Ensure the API server's TLS CA and server certificate exist.
    ServerTls {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long = "san")]
        sans: Vec<String>,
    },
}

fn build_logger(args: &Args) -> io::Result<MultiLogger> {
    let mut logger = MultiLogger::new(vec![Box::new(ConsoleLogger::new(args.debug))]);
    if let Some(path) = &args.log_file {
        let path = shellexpand::tilde(path).to_string();
        logger.push(Box::new(FileLogger::new(&path, args.debug)?));
    }
    Ok(logger)
}

fn run(args: Args) -> io::Result<()> {
    let mut logger = build_logger(&args)?;

    match args.command {
        Command::Generate { force } => {
            let config = ClusterConfig::load_from_file(&args.config)?;
            let mut orchestrator = config.orchestrator(Box::new(logger))?.force(force);
            let certificates = orchestrator.generate()?;
            for name in certificates.cas.names() {
                println!("ca\t{}", name);
            }
            for name in certificates.leaves.names() {
                println!("cert\t{}", name);
            }
        }
        Command::Inspect { path } => {
            let dir = match path {
                Some(path) => path,
                None => {
                    let config = ClusterConfig::load_from_file(&args.config)?;
                    certs_dir_for(&config.cluster_dir()?, config.platform)
                }
            };
            let inventory = discover_certificates(&dir, &mut logger)?;
            let json = serde_json::to_string_pretty(&inventory)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            println!("{}", json);
        }
        Command::ServerTls { dir, name, sans } => {
            let dir = PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).to_string());
            let material = ServerTlsMaterial::ensure(&dir, &name, &sans, &mut logger)?;
            logger.log(&format!(
                "TLS material for {} ready in {}",
                material.name(),
                material.dir().display()
            ));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
