//! Authentication and access-control gate applied to every incoming call.
//!
//! Four checks run in order, matching the layering an export policy needs
//! to enforce: the caller's address must be allowed onto the export at all,
//! then (optionally) must originate from a privileged source port, then must
//! present a credential flavor this server accepts, and finally has its
//! uid/gid possibly remapped by the squash policy before reaching the
//! backing filesystem. Any failure short-circuits the rest.

use std::net::IpAddr;

use crate::config::{ExportOptions, SquashPolicy};
use crate::protocol::xdr::rpc::{auth_flavor, auth_unix, opaque_auth};

/// Why a call was rejected by the gate, used to drive metrics counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    /// Caller's address is not in the allow-list.
    NotAllowed,
    /// Export requires a privileged source port and the caller didn't use one.
    InsecurePort,
    /// Credential flavor is neither `AUTH_NONE` nor `AUTH_SYS`.
    UnsupportedFlavor,
}

/// Effective identity a call runs as, after the squash policy has been applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

/// Runs the full gate: IP, port, flavor, then resolves the effective identity.
///
/// `raw_auth` is the `opaque_auth` carried on the call body; only its flavor
/// is consulted here (`AUTH_SYS` credential bodies are already decoded into
/// `auth_unix` upstream in the wire/dispatch layer and passed separately).
pub fn gate(
    opts: &ExportOptions,
    client_ip: IpAddr,
    client_port: u16,
    raw_auth: &opaque_auth,
    cred: &auth_unix,
) -> Result<Identity, DenyReason> {
    if !opts.allowed_ips.is_empty() && !opts.allowed_ips.iter().any(|a| a.matches(&client_ip)) {
        return Err(DenyReason::NotAllowed);
    }

    if opts.secure && client_port >= 1024 {
        return Err(DenyReason::InsecurePort);
    }

    match raw_auth.flavor {
        auth_flavor::AUTH_NULL | auth_flavor::AUTH_UNIX => {}
        _ => return Err(DenyReason::UnsupportedFlavor),
    }

    Ok(squash(opts, cred))
}

/// Applies the configured squash policy to a decoded credential.
fn squash(opts: &ExportOptions, cred: &auth_unix) -> Identity {
    match opts.squash {
        SquashPolicy::None => Identity { uid: cred.uid, gid: cred.gid },
        SquashPolicy::Root => Identity {
            uid: if cred.uid == 0 { opts.anon_uid } else { cred.uid },
            gid: if cred.gid == 0 { opts.anon_gid } else { cred.gid },
        },
        SquashPolicy::All => Identity { uid: opts.anon_uid, gid: opts.anon_gid },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllowedIp;

    fn cred(uid: u32, gid: u32) -> auth_unix {
        auth_unix { stamp: 0, machinename: Vec::new(), uid, gid, gids: Vec::new() }
    }

    fn none_auth() -> opaque_auth {
        opaque_auth { flavor: auth_flavor::AUTH_NULL, body: Vec::new() }
    }

    #[test]
    fn denies_disallowed_ip() {
        let mut opts = ExportOptions::default();
        opts.allowed_ips.push(AllowedIp::parse("10.0.0.0/24").unwrap());
        let result = gate(&opts, "192.168.1.1".parse().unwrap(), 2049, &none_auth(), &cred(0, 0));
        assert_eq!(result, Err(DenyReason::NotAllowed));
    }

    #[test]
    fn denies_insecure_port_when_required() {
        let mut opts = ExportOptions::default();
        opts.secure = true;
        let result = gate(&opts, "10.0.0.1".parse().unwrap(), 4000, &none_auth(), &cred(0, 0));
        assert_eq!(result, Err(DenyReason::InsecurePort));
    }

    #[test]
    fn root_squash_remaps_only_zero() {
        let mut opts = ExportOptions::default();
        opts.squash = SquashPolicy::Root;
        let id = gate(&opts, "10.0.0.1".parse().unwrap(), 111, &none_auth(), &cred(0, 0)).unwrap();
        assert_eq!(id, Identity { uid: opts.anon_uid, gid: opts.anon_gid });

        let id = gate(&opts, "10.0.0.1".parse().unwrap(), 111, &none_auth(), &cred(501, 20)).unwrap();
        assert_eq!(id, Identity { uid: 501, gid: 20 });
    }

    #[test]
    fn all_squash_remaps_everyone() {
        let mut opts = ExportOptions::default();
        opts.squash = SquashPolicy::All;
        let id = gate(&opts, "10.0.0.1".parse().unwrap(), 111, &none_auth(), &cred(501, 20)).unwrap();
        assert_eq!(id, Identity { uid: opts.anon_uid, gid: opts.anon_gid });
    }
}
