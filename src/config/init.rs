// ABOUTME: Config scaffolding for new hosts.
// ABOUTME: Creates a commented safeship.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ServiceName;

use super::{CONFIG_FILENAME, Config};

pub fn init_config(dir: &Path, service: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let service = ServiceName::new(service.unwrap_or("my-app"))
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;
    let config = Config::template(service);

    let yaml = generate_template_yaml(&config);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    format!(
        r#"service: {service}
app_dir: {app_dir}
backup_dir: {backup_dir}
retention: {retention}

# Must exit 0 before anything on the host is touched. Runs in a staged
# copy of the tag; $SAFESHIP_APP_DIR points at the live tree (e.g. its venv).
gate:
  command: "{gate}"
  timeout: 10m

source:
  type: git
  remote: origin
# Or replace the tree from unpacked release directories:
# source:
#   type: directory
#   path: /srv/releases/{service}
#   preserve: [venv, uploads]

# dependencies:
#   manifest: requirements.txt
#   command: "venv/bin/pip install -r requirements.txt"

health:
  settle: 3s
  interval: 2s
  timeout: 30s

# firewall:
#   port: 5601
#   protocol: tcp
#   allow:
#     - 203.0.113.10

# audit:
#   host: app.example.com
#   timeout: 3s
#   open:
#     - {{ port: 22, label: SSH }}
#     - {{ port: 80, label: HTTP }}
#     - {{ port: 443, label: HTTPS }}
#   closed:
#     - {{ port: 3306, label: MySQL }}
#     - {{ port: 6379, label: Redis }}
#     - {{ port: 5601, label: Kibana }}
"#,
        service = config.service,
        app_dir = config.app_dir.display(),
        backup_dir = config.backup_dir.display(),
        retention = config.retention,
        gate = config.gate.command,
    )
}
