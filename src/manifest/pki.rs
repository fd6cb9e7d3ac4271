//! easy-rsa layout and the PKI command chain

use declarative::template::MANAGED_BANNER;

use crate::config::EasyRsaConfig;

pub const OPENVPN_DIR: &str = "/etc/openvpn";
pub const EASY_RSA_DIR: &str = "/etc/openvpn/easy-rsa";
pub const VARS_FILE: &str = "/etc/openvpn/easy-rsa/vars";
pub const DOWNLOAD_DIR: &str = "/etc/openvpn/download";
pub const OPENSSL_CNF: &str = "/etc/openvpn/easy-rsa/openssl.cnf";
pub const OPENSSL_CNF_TARGET: &str = "/etc/openvpn/easy-rsa/openssl-1.0.0.cnf";
pub const CRL_FILE: &str = "/etc/openvpn/crl.pem";

/// Releases that ship easy-rsa as its own package
const STANDALONE_EASY_RSA: &[&str] = &["jessie", "trusty"];

/// Releases whose easy-rsa already carries a usable `openssl.cnf`
const NATIVE_OPENSSL_CNF: &[&str] = &["squeeze"];

/// One step of the key-generation chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PkiStep {
    pub id: &'static str,
    pub command: &'static str,
    pub creates: &'static str,
}

/// Key generation, in the order each step requires the previous one
pub const CHAIN: [PkiStep; 4] = [
    PkiStep {
        id: "dh1024.pem",
        command: ". ./vars && ./clean-all && ./build-dh",
        creates: "/etc/openvpn/easy-rsa/keys/dh1024.pem",
    },
    PkiStep {
        id: "ca.key",
        command: ". ./vars && ./pkitool --initca",
        creates: "/etc/openvpn/easy-rsa/keys/ca.key",
    },
    PkiStep {
        id: "server.key",
        command: ". ./vars && ./pkitool --server server",
        creates: "/etc/openvpn/easy-rsa/keys/server.key",
    },
    PkiStep {
        id: "crl.pem",
        command: ". ./vars && KEY_CN='' KEY_NAME='' KEY_OU='' openssl ca -gencrl -out /etc/openvpn/crl.pem -config /etc/openvpn/easy-rsa/openssl.cnf",
        creates: CRL_FILE,
    },
];

/// Where the distribution keeps the easy-rsa scripts
pub fn easy_rsa_layout(codename: &str) -> &'static str {
    if STANDALONE_EASY_RSA.contains(&codename) {
        "/usr/share/easy-rsa"
    } else {
        "/usr/share/doc/openvpn/examples/easy-rsa/2.0"
    }
}

/// Command that seeds `/etc/openvpn/easy-rsa`
pub fn copy_command(codename: &str) -> String {
    format!("cp -r {} {EASY_RSA_DIR}", easy_rsa_layout(codename))
}

/// Whether `openssl.cnf` has to be linked to the 1.0.0 variant
pub fn needs_openssl_link(codename: &str) -> bool {
    !NATIVE_OPENSSL_CNF.contains(&codename)
}

/// Content of the easy-rsa `vars` file
pub fn vars_file(cfg: &EasyRsaConfig) -> String {
    let mut out = format!("{MANAGED_BANNER}\n\n");
    for (key, value) in [
        ("EASY_RSA", EASY_RSA_DIR),
        ("OPENSSL", "openssl"),
        ("PKCS11TOOL", "pkcs11-tool"),
        ("GREP", "grep"),
    ] {
        out.push_str(&format!("export {key}=\"{value}\"\n"));
    }
    out.push_str("export KEY_CONFIG=`$EASY_RSA/whichopensslcnf $EASY_RSA`\n");
    out.push_str("export KEY_DIR=\"$EASY_RSA/keys\"\n");
    out.push_str("export PKCS11_MODULE_PATH=\"dummy\"\n");
    out.push_str("export PKCS11_PIN=\"dummy\"\n");
    out.push_str("export KEY_SIZE=1024\n");
    out.push_str("export CA_EXPIRE=3650\n");
    out.push_str("export KEY_EXPIRE=3650\n");

    for (key, value) in [
        ("KEY_COUNTRY", &cfg.country),
        ("KEY_PROVINCE", &cfg.province),
        ("KEY_CITY", &cfg.city),
        ("KEY_ORG", &cfg.org),
        ("KEY_EMAIL", &cfg.email),
        ("KEY_OU", &cfg.ou),
    ] {
        out.push_str(&format!("export {key}=\"{}\"\n", escape(value)));
    }
    out
}

/// Escape for a double-quoted shell string
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
