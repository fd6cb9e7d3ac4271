//! OpenVPN manifest - builds the resource graph for one host
//!
//! The package owns everything it puts under `/etc/openvpn`; when it is
//! absent or purged the state cascade turns those resources absent too.
//! The PKI chain only exists while the package is installed.

pub mod pki;

use anyhow::{Context, Result};
use declarative::{
    CommandSpec, ContentSource, DesiredState, EdgeKind, FileSpec, PackageSpec, ResourceGraph,
    ResourceKind, ServiceSpec, cascade,
};

use crate::config::ProvisionConfig;
use crate::facts::PlatformFacts;
use pki::{CHAIN, EASY_RSA_DIR};

pub const PACKAGE_ID: &str = "openvpn";
pub const SERVICE_ID: &str = "service:openvpn";
pub const EASY_RSA_COPY_ID: &str = "easy-rsa.dir";
pub const EASY_RSA_VARS_ID: &str = "easy-rsa.conf";
pub const OPENSSL_CNF_ID: &str = "openssl.cnf";
pub const CONFIG_FILE_ID: &str = "openvpn.conf";
pub const CONFIG_DIR_ID: &str = "openvpn.dir";
pub const CONFIG_FILE: &str = "/etc/openvpn/openvpn.conf";

/// Build, cascade and validate the graph
pub fn build(config: &ProvisionConfig, facts: &PlatformFacts) -> Result<ResourceGraph> {
    let mut graph = ResourceGraph::new();
    let installed = config.package.ensure.is_installed();

    graph.add_node(
        PACKAGE_ID,
        ResourceKind::Package,
        DesiredState::Package(PackageSpec {
            name: config.package.name.clone(),
            ensure: config.package.ensure,
        }),
    )?;

    // Owned easy-rsa resources hang off the copy when it exists
    let anchor = if installed {
        graph.add_node(
            EASY_RSA_COPY_ID,
            ResourceKind::GuardedCommand,
            DesiredState::Command(CommandSpec {
                command: pki::copy_command(&facts.codename),
                creates: EASY_RSA_DIR.into(),
                cwd: None,
            }),
        )?;
        graph.add_edge(EdgeKind::Requires, EASY_RSA_COPY_ID, PACKAGE_ID)?;
        EASY_RSA_COPY_ID
    } else {
        PACKAGE_ID
    };

    graph.add_node(
        EASY_RSA_VARS_ID,
        ResourceKind::File,
        DesiredState::File(FileSpec::file(
            pki::VARS_FILE,
            ContentSource::Literal(pki::vars_file(&config.easy_rsa)),
        )),
    )?;
    own(&mut graph, EASY_RSA_VARS_ID, anchor)?;

    for dir in [pki::DOWNLOAD_DIR, EASY_RSA_DIR] {
        graph.add_node(
            dir,
            ResourceKind::Directory,
            DesiredState::File(FileSpec::directory(dir)),
        )?;
        own(&mut graph, dir, anchor)?;
    }

    if installed {
        add_pki_chain(&mut graph, &facts.codename)?;
    }

    graph.add_node(
        CONFIG_FILE_ID,
        ResourceKind::File,
        DesiredState::File(FileSpec::file(CONFIG_FILE, config_content(config))),
    )?;
    own(&mut graph, CONFIG_FILE_ID, PACKAGE_ID)?;

    if let Some(source) = &config.config_dir.source {
        let dir = &config.config_dir;
        graph.add_node(
            CONFIG_DIR_ID,
            ResourceKind::Directory,
            DesiredState::File(FileSpec {
                content: ContentSource::Source(config.resolve(source)),
                recurse: dir.recurse,
                purge: dir.purge,
                force: dir.purge,
                ..FileSpec::directory(pki::OPENVPN_DIR)
            }),
        )?;
        own(&mut graph, CONFIG_DIR_ID, PACKAGE_ID)?;
    }

    let (ensure, enable) = cascade::service_defaults(
        config.package.ensure,
        config.service.ensure,
        config.service.enable,
    );
    graph.add_node(
        SERVICE_ID,
        ResourceKind::Service,
        DesiredState::Service(ServiceSpec {
            name: config.service.name.clone(),
            ensure,
            enable,
        }),
    )?;
    graph.add_edge(EdgeKind::Requires, SERVICE_ID, PACKAGE_ID)?;
    graph.add_edge(EdgeKind::Notifies, CONFIG_FILE_ID, SERVICE_ID)?;
    if graph.contains(CONFIG_DIR_ID) {
        graph.add_edge(EdgeKind::Notifies, CONFIG_DIR_ID, SERVICE_ID)?;
    }
    if installed {
        graph.add_edge(EdgeKind::Precedes, "crl.pem", SERVICE_ID)?;
    }

    cascade::apply(&mut graph, PACKAGE_ID).context("Failed to cascade package state")?;
    graph.validate().context("Invalid resource graph")?;

    log::debug!(
        "Built graph with {} nodes and {} edges",
        graph.len(),
        graph.edges().len()
    );
    Ok(graph)
}

/// Owned by the package, applied after `requires`
fn own(graph: &mut ResourceGraph, id: &str, requires: &str) -> Result<()> {
    graph.add_edge(EdgeKind::Owns, PACKAGE_ID, id)?;
    graph.add_edge(EdgeKind::Requires, id, requires)?;
    Ok(())
}

fn add_pki_chain(graph: &mut ResourceGraph, codename: &str) -> Result<()> {
    let mut previous = EASY_RSA_VARS_ID;
    for step in &CHAIN {
        graph.add_node(
            step.id,
            ResourceKind::GuardedCommand,
            DesiredState::Command(CommandSpec {
                command: step.command.to_string(),
                creates: step.creates.into(),
                cwd: Some(EASY_RSA_DIR.into()),
            }),
        )?;
        graph.add_edge(EdgeKind::Requires, step.id, previous)?;
        previous = step.id;
    }

    if pki::needs_openssl_link(codename) {
        graph.add_node(
            OPENSSL_CNF_ID,
            ResourceKind::Symlink,
            DesiredState::File(FileSpec::link(pki::OPENSSL_CNF, pki::OPENSSL_CNF_TARGET)),
        )?;
        own(graph, OPENSSL_CNF_ID, EASY_RSA_COPY_ID)?;
        graph.add_edge(EdgeKind::Precedes, OPENSSL_CNF_ID, "crl.pem")?;
    }
    Ok(())
}

/// Content of `openvpn.conf`: source, then literal content, then template
fn config_content(config: &ProvisionConfig) -> ContentSource {
    let file = &config.config_file;
    if file.modes_set() > 1 {
        log::warn!(
            "config_file sets more than one of source, content and template; using the first of those"
        );
    }

    if let Some(source) = &file.source {
        ContentSource::Source(config.resolve(source))
    } else if let Some(content) = &file.content {
        ContentSource::Literal(content.clone())
    } else if let Some(template) = &file.template {
        ContentSource::Template {
            path: config.resolve(template),
            options: file.options.clone(),
        }
    } else {
        ContentSource::Unmanaged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{FileEnsure, PackageEnsure, ServiceEnsure};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn facts(codename: &str) -> PlatformFacts {
        PlatformFacts {
            codename: codename.to_string(),
        }
    }

    fn build_with(config: &ProvisionConfig, codename: &str) -> ResourceGraph {
        build(config, &facts(codename)).unwrap()
    }

    fn with_package(ensure: PackageEnsure) -> ProvisionConfig {
        let mut config = ProvisionConfig::default();
        config.package.ensure = ensure;
        config
    }

    fn file<'g>(graph: &'g ResourceGraph, id: &str) -> &'g FileSpec {
        match &graph.node(id).unwrap().desired {
            DesiredState::File(spec) => spec,
            other => panic!("{id}: expected file state, got {other:?}"),
        }
    }

    fn command<'g>(graph: &'g ResourceGraph, id: &str) -> &'g CommandSpec {
        match &graph.node(id).unwrap().desired {
            DesiredState::Command(spec) => spec,
            other => panic!("{id}: expected command, got {other:?}"),
        }
    }

    fn service(graph: &ResourceGraph) -> &ServiceSpec {
        match &graph.node(SERVICE_ID).unwrap().desired {
            DesiredState::Service(spec) => spec,
            other => panic!("expected service, got {other:?}"),
        }
    }

    fn package(graph: &ResourceGraph) -> &PackageSpec {
        match &graph.node(PACKAGE_ID).unwrap().desired {
            DesiredState::Package(spec) => spec,
            other => panic!("expected package, got {other:?}"),
        }
    }

    fn position(graph: &ResourceGraph, id: &str) -> usize {
        graph
            .topological_order()
            .unwrap()
            .iter()
            .position(|r| r.id == id)
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let graph = build_with(&ProvisionConfig::default(), "wheezy");

        assert_eq!(package(&graph).ensure, PackageEnsure::Present);
        assert_eq!(package(&graph).name, "openvpn");

        let copy = command(&graph, EASY_RSA_COPY_ID);
        assert_eq!(
            copy.command,
            "cp -r /usr/share/doc/openvpn/examples/easy-rsa/2.0 /etc/openvpn/easy-rsa"
        );
        assert_eq!(copy.creates, PathBuf::from("/etc/openvpn/easy-rsa"));
        assert_eq!(graph.requirements(EASY_RSA_COPY_ID), [PACKAGE_ID]);

        let vars = file(&graph, EASY_RSA_VARS_ID);
        assert_eq!(vars.path, PathBuf::from("/etc/openvpn/easy-rsa/vars"));
        assert_eq!(vars.ensure, FileEnsure::Present);
        assert_eq!(graph.requirements(EASY_RSA_VARS_ID), [EASY_RSA_COPY_ID]);

        for dir in ["/etc/openvpn/download", "/etc/openvpn/easy-rsa"] {
            assert_eq!(file(&graph, dir).ensure, FileEnsure::Directory);
            assert_eq!(graph.requirements(dir), [EASY_RSA_COPY_ID]);
        }

        let conf = file(&graph, CONFIG_FILE_ID);
        assert_eq!(conf.path, PathBuf::from(CONFIG_FILE));
        assert_eq!(conf.content, ContentSource::Unmanaged);
        assert_eq!(graph.notify_targets(CONFIG_FILE_ID), [SERVICE_ID]);

        assert!(!graph.contains(CONFIG_DIR_ID));

        let svc = service(&graph);
        assert_eq!(svc.ensure, ServiceEnsure::Running);
        assert!(svc.enable);
        assert_eq!(graph.requirements(SERVICE_ID), [PACKAGE_ID]);
    }

    #[test]
    fn test_pki_chain() {
        let graph = build_with(&ProvisionConfig::default(), "wheezy");

        let dh = command(&graph, "dh1024.pem");
        assert_eq!(dh.command, ". ./vars && ./clean-all && ./build-dh");
        assert_eq!(
            dh.creates,
            PathBuf::from("/etc/openvpn/easy-rsa/keys/dh1024.pem")
        );
        assert_eq!(dh.cwd, Some(PathBuf::from("/etc/openvpn/easy-rsa")));
        assert_eq!(graph.requirements("dh1024.pem"), [EASY_RSA_VARS_ID]);

        assert_eq!(
            command(&graph, "ca.key").command,
            ". ./vars && ./pkitool --initca"
        );
        assert_eq!(graph.requirements("ca.key"), ["dh1024.pem"]);
        assert_eq!(
            command(&graph, "server.key").command,
            ". ./vars && ./pkitool --server server"
        );
        assert_eq!(graph.requirements("server.key"), ["ca.key"]);

        let crl = command(&graph, "crl.pem");
        assert_eq!(
            crl.command,
            ". ./vars && KEY_CN='' KEY_NAME='' KEY_OU='' openssl ca -gencrl -out /etc/openvpn/crl.pem -config /etc/openvpn/easy-rsa/openssl.cnf"
        );
        assert_eq!(crl.creates, PathBuf::from("/etc/openvpn/crl.pem"));
        assert_eq!(graph.requirements("crl.pem"), ["server.key"]);

        let link = file(&graph, OPENSSL_CNF_ID);
        assert_eq!(link.ensure, FileEnsure::Link);
        assert_eq!(
            link.target,
            Some(PathBuf::from("/etc/openvpn/easy-rsa/openssl-1.0.0.cnf"))
        );
        assert_eq!(graph.requirements(OPENSSL_CNF_ID), [EASY_RSA_COPY_ID]);

        assert!(position(&graph, OPENSSL_CNF_ID) < position(&graph, "crl.pem"));
        assert!(position(&graph, "crl.pem") < position(&graph, SERVICE_ID));
        assert!(position(&graph, EASY_RSA_VARS_ID) < position(&graph, "dh1024.pem"));
    }

    #[test]
    fn test_package_latest() {
        let graph = build_with(&with_package(PackageEnsure::Latest), "wheezy");
        assert_eq!(package(&graph).ensure, PackageEnsure::Latest);
        assert!(graph.contains("crl.pem"));
        assert_eq!(file(&graph, CONFIG_FILE_ID).ensure, FileEnsure::Present);
    }

    #[test]
    fn test_package_removed_cascades() {
        for ensure in [PackageEnsure::Absent, PackageEnsure::Purged] {
            let graph = build_with(&with_package(ensure), "wheezy");
            assert_eq!(package(&graph).ensure, ensure);

            for id in [EASY_RSA_COPY_ID, "dh1024.pem", "ca.key", "server.key", "crl.pem", OPENSSL_CNF_ID] {
                assert!(!graph.contains(id), "{id} should not exist for {ensure}");
            }

            assert_eq!(file(&graph, EASY_RSA_VARS_ID).ensure, FileEnsure::Absent);
            assert_eq!(graph.requirements(EASY_RSA_VARS_ID), [PACKAGE_ID]);
            for dir in ["/etc/openvpn/download", "/etc/openvpn/easy-rsa"] {
                let spec = file(&graph, dir);
                assert_eq!(spec.ensure, FileEnsure::Absent);
                assert!(spec.force && spec.recurse);
            }
            assert_eq!(file(&graph, CONFIG_FILE_ID).ensure, FileEnsure::Absent);

            let svc = service(&graph);
            assert_eq!(svc.ensure, ServiceEnsure::Stopped);
            assert!(!svc.enable);
        }
    }

    #[test]
    fn test_config_dir_source() {
        let mut config = ProvisionConfig::default();
        config.source_root = Some("/srv/files".into());
        config.config_dir.source = Some("common/etc/openvpn".into());
        let graph = build_with(&config, "wheezy");

        let dir = file(&graph, CONFIG_DIR_ID);
        assert_eq!(dir.path, PathBuf::from("/etc/openvpn"));
        assert_eq!(dir.ensure, FileEnsure::Directory);
        assert_eq!(
            dir.content,
            ContentSource::Source("/srv/files/common/etc/openvpn".into())
        );
        assert!(dir.recurse);
        assert!(!dir.purge && !dir.force);
        assert_eq!(graph.requirements(CONFIG_DIR_ID), [PACKAGE_ID]);
        assert_eq!(graph.notify_targets(CONFIG_DIR_ID), [SERVICE_ID]);
    }

    #[test]
    fn test_config_dir_purge() {
        let mut config = ProvisionConfig::default();
        config.config_dir.source = Some("/srv/files/openvpn".into());
        config.config_dir.purge = true;
        let graph = build_with(&config, "wheezy");

        let dir = file(&graph, CONFIG_DIR_ID);
        assert!(dir.recurse && dir.purge && dir.force);
    }

    #[test]
    fn test_config_file_source() {
        let mut config = ProvisionConfig::default();
        config.config_file.source = Some("file:///srv/files/openvpn.conf".into());
        let graph = build_with(&config, "wheezy");
        assert_eq!(
            file(&graph, CONFIG_FILE_ID).content,
            ContentSource::Source("/srv/files/openvpn.conf".into())
        );
    }

    #[test]
    fn test_config_file_content() {
        let mut config = ProvisionConfig::default();
        config.config_file.content = Some("# managed".into());
        let graph = build_with(&config, "wheezy");

        let conf = file(&graph, CONFIG_FILE_ID);
        assert_eq!(conf.ensure, FileEnsure::Present);
        assert_eq!(conf.content, ContentSource::Literal("# managed".into()));
        assert_eq!(conf.content.source(), None);
        assert_eq!(graph.notify_targets(CONFIG_FILE_ID), [SERVICE_ID]);
    }

    #[test]
    fn test_config_file_template() {
        let mut config = ProvisionConfig::default();
        config.source_root = Some("/srv/files".into());
        config.config_file.template = Some("templates/openvpn.conf.tmpl".into());
        config.config_file.options =
            BTreeMap::from([("port".to_string(), "443".to_string())]);
        let graph = build_with(&config, "wheezy");

        assert_eq!(
            file(&graph, CONFIG_FILE_ID).content,
            ContentSource::Template {
                path: "/srv/files/templates/openvpn.conf.tmpl".into(),
                options: BTreeMap::from([("port".to_string(), "443".to_string())]),
            }
        );
    }

    #[test]
    fn test_config_file_precedence() {
        let mut config = ProvisionConfig::default();
        config.config_file.template = Some("/srv/t.tmpl".into());
        config.config_file.content = Some("inline\n".into());
        let graph = build_with(&config, "wheezy");
        assert_eq!(
            file(&graph, CONFIG_FILE_ID).content,
            ContentSource::Literal("inline\n".into())
        );

        config.config_file.source = Some("/srv/openvpn.conf".into());
        let graph = build_with(&config, "wheezy");
        assert_eq!(
            file(&graph, CONFIG_FILE_ID).content,
            ContentSource::Source("/srv/openvpn.conf".into())
        );
    }

    #[test]
    fn test_codename_layouts() {
        for codename in ["jessie", "trusty"] {
            let graph = build_with(&ProvisionConfig::default(), codename);
            assert_eq!(
                command(&graph, EASY_RSA_COPY_ID).command,
                "cp -r /usr/share/easy-rsa /etc/openvpn/easy-rsa"
            );
            assert!(graph.contains(OPENSSL_CNF_ID));
        }
    }

    #[test]
    fn test_squeeze_has_no_openssl_link() {
        let graph = build_with(&ProvisionConfig::default(), "squeeze");
        assert!(!graph.contains(OPENSSL_CNF_ID));
        assert!(graph.contains("crl.pem"));
        assert_eq!(
            command(&graph, EASY_RSA_COPY_ID).command,
            "cp -r /usr/share/doc/openvpn/examples/easy-rsa/2.0 /etc/openvpn/easy-rsa"
        );
    }

    #[test]
    fn test_service_stopped_stays_enabled() {
        let mut config = ProvisionConfig::default();
        config.service.ensure = Some(ServiceEnsure::Stopped);
        let graph = build_with(&config, "wheezy");
        let svc = service(&graph);
        assert_eq!(svc.ensure, ServiceEnsure::Stopped);
        assert!(svc.enable);
    }

    #[test]
    fn test_owned_resources() {
        let mut config = ProvisionConfig::default();
        config.config_dir.source = Some("/srv/openvpn".into());
        let graph = build_with(&config, "wheezy");

        let owned = graph.owned_by(PACKAGE_ID);
        for id in [
            EASY_RSA_VARS_ID,
            "/etc/openvpn/download",
            "/etc/openvpn/easy-rsa",
            OPENSSL_CNF_ID,
            CONFIG_FILE_ID,
            CONFIG_DIR_ID,
        ] {
            assert!(owned.contains(&id), "{id} should be owned");
        }
        assert!(!owned.contains(&SERVICE_ID));
        assert!(!owned.contains(&"crl.pem"));
    }
}
