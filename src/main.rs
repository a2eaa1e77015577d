/// Version injected at compile time via HWSTAGE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("HWSTAGE_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hwstage::config::Config;
use hwstage::huawei::auth::{self, Credentials};
use hwstage::huawei::client::{CceClient, KubeClient, ServiceStageClient};
use hwstage::manifest::Manifest;
use hwstage::resource::{application, cluster, component, environment, instance, service, wait};
use hwstage::state::{ResourceKind, State, StateEntry};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Declarative resource manager for Huawei Cloud ServiceStage and CCE
#[derive(Parser, Debug)]
#[command(name = "hwstage", version = VERSION, about, long_about = None)]
struct Args {
    /// Huawei Cloud region to use
    #[arg(short, long)]
    region: Option<String>,

    /// Huawei Cloud project ID to use
    #[arg(short, long)]
    project: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update every resource in the manifest
    Apply {
        /// Manifest file (YAML or JSON)
        #[arg(short, long, default_value = "hwstage.yaml")]
        manifest: PathBuf,

        /// State file tracking server-assigned ids
        #[arg(long, default_value = "hwstage.state.json")]
        state: PathBuf,

        /// Seconds to wait for a resource to become active
        #[arg(long, default_value_t = wait::DEFAULT_CREATE_TIMEOUT.as_secs())]
        create_timeout: u64,
    },

    /// Delete every resource tracked in the state file
    Destroy {
        /// State file tracking server-assigned ids
        #[arg(long, default_value = "hwstage.state.json")]
        state: PathBuf,

        /// Seconds to wait for a resource to disappear
        #[arg(long, default_value_t = wait::DEFAULT_DELETE_TIMEOUT.as_secs())]
        delete_timeout: u64,
    },

    /// Read one tracked resource and print it
    Read {
        /// Resource kind
        #[arg(value_enum)]
        kind: CliKind,

        /// Resource name as written in the manifest
        name: String,

        /// State file tracking server-assigned ids
        #[arg(long, default_value = "hwstage.state.json")]
        state: PathBuf,
    },

    /// Look up CCE clusters in the project
    Clusters {
        /// Only the cluster with this name
        #[arg(long)]
        name: Option<String>,

        /// Only the cluster with this id
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliKind {
    Application,
    Environment,
    Component,
    Instance,
    Service,
}

impl From<CliKind> for ResourceKind {
    fn from(kind: CliKind) -> Self {
        match kind {
            CliKind::Application => ResourceKind::Application,
            CliKind::Environment => ResourceKind::Environment,
            CliKind::Component => ResourceKind::Component,
            CliKind::Instance => ResourceKind::Instance,
            CliKind::Service => ResourceKind::Service,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .expect("Failed to open log file");

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("hwstage started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("hwstage").join("hwstage.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".hwstage").join("hwstage.log");
    }
    PathBuf::from("hwstage.log")
}

/// The per-service clients, built once per invocation
struct Clients {
    servicestage: ServiceStageClient,
    cce: CceClient,
}

fn build_clients(region: &str, project: &str) -> Result<Clients> {
    if !auth::validate_region(region) {
        anyhow::bail!("Invalid region {region:?}. Expected something like cn-north-4");
    }
    if project.is_empty() {
        anyhow::bail!("No project configured. Set HW_PROJECT_ID or use --project");
    }

    let credentials = Credentials::from_env(region, Some(project))?;

    // Endpoint overrides are for tests and private deployments
    let servicestage = match std::env::var("HW_SERVICESTAGE_ENDPOINT") {
        Ok(endpoint) => {
            ServiceStageClient::with_endpoint(credentials.clone(), region, project, &endpoint)?
        }
        Err(_) => ServiceStageClient::new(credentials.clone(), region, project)?,
    };
    let cce = match std::env::var("HW_CCE_ENDPOINT") {
        Ok(endpoint) => CceClient::with_endpoint(credentials, region, project, &endpoint)?,
        Err(_) => CceClient::new(credentials, region, project)?,
    };

    Ok(Clients { servicestage, cce })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let mut config = Config::load();
    let region = args.region.clone().unwrap_or_else(|| config.effective_region());
    let project = args.project.clone().unwrap_or_else(|| config.effective_project());

    let clients = build_clients(&region, &project)?;
    tracing::info!("Using region: {}, project: {}", region, project);

    // Remember explicit choices for next time
    if args.region.is_some() {
        config.set_region(&region)?;
    }
    if args.project.is_some() {
        config.set_project(&project)?;
    }

    match args.command {
        Command::Apply {
            manifest,
            state,
            create_timeout,
        } => {
            let manifest = Manifest::load(&manifest)?;
            manifest.validate().context("Manifest validation failed")?;
            if manifest.is_empty() {
                println!("Manifest is empty, nothing to do");
                return Ok(());
            }
            apply(&clients, &manifest, &state, Duration::from_secs(create_timeout)).await
        }
        Command::Destroy { state, delete_timeout } => {
            destroy(&clients, &state, Duration::from_secs(delete_timeout)).await
        }
        Command::Read { kind, name, state } => {
            read_one(&clients, kind.into(), &name, &state).await
        }
        Command::Clusters { name, id } => {
            if name.is_none() && id.is_none() {
                let clusters = cluster::list(&clients.cce).await?;
                for c in &clusters {
                    println!("{}  {}  {}", c.id, c.name, c.status);
                }
                if clusters.is_empty() {
                    println!("No clusters found");
                }
            } else {
                let query = cluster::ClusterQuery { name, id };
                match cluster::find(&clients.cce, &query).await? {
                    Some(c) => println!("{}", serde_json::to_string_pretty(&c)?),
                    None => println!("No matching cluster"),
                }
            }
            Ok(())
        }
    }
}

/// Reconcile the manifest against the tracked state, in dependency order:
/// applications and environments first, then components, deployments, and
/// Kubernetes services.
async fn apply(
    clients: &Clients,
    manifest: &Manifest,
    state_path: &Path,
    timeout: Duration,
) -> Result<()> {
    let mut state = State::load(state_path);
    let ss = &clients.servicestage;

    for spec in &manifest.applications {
        let existing = match state.get(ResourceKind::Application, &spec.name) {
            Some(entry) => application::get(ss, &entry.id).await?,
            None => None,
        };
        match existing {
            Some(current) => {
                let update = spec.diff(&current);
                if update.is_empty() {
                    println!("application/{} unchanged", spec.name);
                } else {
                    application::update(ss, &current.id, &update).await?;
                    println!("application/{} updated", spec.name);
                }
            }
            None => {
                state.remove(ResourceKind::Application, &spec.name);
                let created = application::create(ss, spec, timeout).await?;
                state.set(&spec.name, StateEntry::new(ResourceKind::Application, &created.id));
                state.save(state_path)?;
                println!("application/{} created ({})", spec.name, created.id);
            }
        }
    }

    for spec in &manifest.environments {
        let existing = match state.get(ResourceKind::Environment, &spec.name) {
            Some(entry) => environment::get(ss, &entry.id).await?,
            None => None,
        };
        match existing {
            Some(current) => {
                let update = spec.diff(&current);
                if update.is_empty() {
                    println!("environment/{} unchanged", spec.name);
                } else {
                    environment::update(ss, &current.id, &update).await?;
                    println!("environment/{} updated", spec.name);
                }
            }
            None => {
                state.remove(ResourceKind::Environment, &spec.name);
                let created = environment::create(ss, spec, timeout).await?;
                state.set(&spec.name, StateEntry::new(ResourceKind::Environment, &created.id));
                state.save(state_path)?;
                println!("environment/{} created ({})", spec.name, created.id);
            }
        }
    }

    for spec in &manifest.components {
        let existing = match state.get(ResourceKind::Component, &spec.name) {
            Some(entry) => component::get(ss, &spec.application_id, &entry.id).await?,
            None => None,
        };
        match existing {
            Some(current) => {
                let update = spec.diff(&current);
                if update.is_empty() {
                    println!("component/{} unchanged", spec.name);
                } else {
                    component::update(ss, &spec.application_id, &current.id, &update).await?;
                    println!("component/{} updated", spec.name);
                }
            }
            None => {
                state.remove(ResourceKind::Component, &spec.name);
                let created = component::create(ss, spec, timeout).await?;
                let mut entry = StateEntry::new(ResourceKind::Component, &created.id);
                entry.application_id = Some(spec.application_id.clone());
                state.set(&spec.name, entry);
                state.save(state_path)?;
                println!("component/{} created ({})", spec.name, created.id);
            }
        }
    }

    for spec in &manifest.instances {
        let existing = match state.get(ResourceKind::Instance, &spec.name) {
            Some(entry) => {
                instance::get(ss, &spec.application_id, &spec.component_id, &entry.id).await?
            }
            None => None,
        };
        match existing {
            Some(current) => {
                let update = spec.diff(&current);
                if update.is_empty() {
                    println!("instance/{} unchanged", spec.name);
                } else {
                    instance::update(
                        ss,
                        &spec.application_id,
                        &spec.component_id,
                        &current.id,
                        &update,
                    )
                    .await?;
                    println!("instance/{} updated", spec.name);
                }
            }
            None => {
                state.remove(ResourceKind::Instance, &spec.name);
                let created = instance::create(ss, spec, timeout).await?;
                let mut entry = StateEntry::new(ResourceKind::Instance, &created.id);
                entry.application_id = Some(spec.application_id.clone());
                entry.component_id = Some(spec.component_id.clone());
                state.set(&spec.name, entry);
                state.save(state_path)?;
                println!("instance/{} created ({})", spec.name, created.id);
            }
        }
    }

    for entry in &manifest.services {
        let kube = kube_client(clients, &entry.cluster_id)?;
        let name = entry.service.metadata.name.clone();
        let namespace = entry.service.metadata.namespace.clone();

        let existing = match state.get(ResourceKind::Service, &name) {
            Some(tracked) => {
                let ns = tracked.namespace.as_deref().unwrap_or(&namespace);
                service::get(&kube, ns, &tracked.id).await?
            }
            None => None,
        };
        match existing {
            Some(_) => {
                // In-place service mutation is name-only, and the name is the id;
                // everything else forces a recreate
                println!("service/{} unchanged", name);
            }
            None => {
                state.remove(ResourceKind::Service, &name);
                service::create(&kube, &entry.service, timeout).await?;
                let mut tracked = StateEntry::new(ResourceKind::Service, &name);
                tracked.cluster_id = Some(entry.cluster_id.clone());
                tracked.namespace = Some(namespace.clone());
                state.set(&name, tracked);
                state.save(state_path)?;
                println!("service/{} created in {}/{}", name, entry.cluster_id, namespace);
            }
        }
    }

    state.save(state_path)?;
    println!("Apply complete: {} resources tracked", state.len());
    Ok(())
}

/// Tear down everything in the state file, leaves first: deployments and
/// services before the components, environments, and applications they
/// depend on.
async fn destroy(clients: &Clients, state_path: &Path, timeout: Duration) -> Result<()> {
    let mut state = State::load(state_path);
    if state.is_empty() {
        println!("State is empty, nothing to destroy");
        return Ok(());
    }
    let ss = &clients.servicestage;

    for (name, entry) in state.of_kind(ResourceKind::Instance) {
        let application_id = entry
            .application_id
            .as_deref()
            .context("instance state entry is missing its application id")?;
        let component_id = entry
            .component_id
            .as_deref()
            .context("instance state entry is missing its component id")?;
        instance::delete(ss, application_id, component_id, &entry.id, timeout).await?;
        state.remove(ResourceKind::Instance, &name);
        state.save(state_path)?;
        println!("instance/{} deleted", name);
    }

    for (name, entry) in state.of_kind(ResourceKind::Service) {
        let cluster_id = entry
            .cluster_id
            .as_deref()
            .context("service state entry is missing its cluster id")?;
        let namespace = entry.namespace.as_deref().unwrap_or("default");
        let kube = kube_client(clients, cluster_id)?;
        service::delete(&kube, namespace, &entry.id, timeout).await?;
        state.remove(ResourceKind::Service, &name);
        state.save(state_path)?;
        println!("service/{} deleted", name);
    }

    for (name, entry) in state.of_kind(ResourceKind::Component) {
        let application_id = entry
            .application_id
            .as_deref()
            .context("component state entry is missing its application id")?;
        component::delete(ss, application_id, &entry.id, timeout).await?;
        state.remove(ResourceKind::Component, &name);
        state.save(state_path)?;
        println!("component/{} deleted", name);
    }

    for (name, entry) in state.of_kind(ResourceKind::Environment) {
        environment::delete(ss, &entry.id, timeout).await?;
        state.remove(ResourceKind::Environment, &name);
        state.save(state_path)?;
        println!("environment/{} deleted", name);
    }

    for (name, entry) in state.of_kind(ResourceKind::Application) {
        application::delete(ss, &entry.id, timeout).await?;
        state.remove(ResourceKind::Application, &name);
        state.save(state_path)?;
        println!("application/{} deleted", name);
    }

    println!("Destroy complete");
    Ok(())
}

/// Read one tracked resource; a vanished resource is dropped from state
async fn read_one(
    clients: &Clients,
    kind: ResourceKind,
    name: &str,
    state_path: &Path,
) -> Result<()> {
    let mut state = State::load(state_path);
    let Some(entry) = state.get(kind, name).cloned() else {
        println!("{kind}/{name} is not tracked");
        return Ok(());
    };
    let ss = &clients.servicestage;

    let value = match kind {
        ResourceKind::Application => application::get(ss, &entry.id)
            .await?
            .map(serde_json::to_value)
            .transpose()?,
        ResourceKind::Environment => environment::get(ss, &entry.id)
            .await?
            .map(serde_json::to_value)
            .transpose()?,
        ResourceKind::Component => {
            let application_id = entry
                .application_id
                .as_deref()
                .context("component state entry is missing its application id")?;
            component::get(ss, application_id, &entry.id)
                .await?
                .map(serde_json::to_value)
                .transpose()?
        }
        ResourceKind::Instance => {
            let application_id = entry
                .application_id
                .as_deref()
                .context("instance state entry is missing its application id")?;
            let component_id = entry
                .component_id
                .as_deref()
                .context("instance state entry is missing its component id")?;
            instance::get(ss, application_id, component_id, &entry.id)
                .await?
                .map(serde_json::to_value)
                .transpose()?
        }
        ResourceKind::Service => {
            let cluster_id = entry
                .cluster_id
                .as_deref()
                .context("service state entry is missing its cluster id")?;
            let namespace = entry.namespace.as_deref().unwrap_or("default");
            let kube = kube_client(clients, cluster_id)?;
            service::get(&kube, namespace, &entry.id)
                .await?
                .map(serde_json::to_value)
                .transpose()?
        }
    };

    match value {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => {
            // Gone on the server: clear the local id, not an error
            state.remove(kind, name);
            state.save(state_path)?;
            println!("{kind}/{name} no longer exists, removed from state");
        }
    }
    Ok(())
}

fn kube_client(clients: &Clients, cluster_id: &str) -> Result<KubeClient> {
    match std::env::var("HW_KUBE_ENDPOINT") {
        Ok(endpoint) => {
            KubeClient::with_endpoint(clients.cce.credentials.clone(), &endpoint)
        }
        Err(_) => clients.cce.cluster_scoped(cluster_id),
    }
}
