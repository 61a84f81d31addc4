//! PORTMAP protocol implementation as specified in RFC 1057 A.1 and A.2 sections,
//! plus rpcbind v3/v4 (RFC 1833) for clients that prefer universal addresses
//! over bare port numbers.
//! https://datatracker.ietf.org/doc/rfc1057/

use std::collections::HashMap;
use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;
use tracing::error;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, nfs3::nfsstring, portmap, DeserializeEnum, SerializeEnum, Serialize};

mod dump;
mod get_addr;
mod get_port;
mod null;
mod set_port;
mod unset_port;

use dump::pmapproc_dump;
use get_addr::rpcbproc_getaddr;
use get_port::pmapproc_getport;
use null::pmapproc_null;
use set_port::pmapproc_setport;
use unset_port::pmapproc_unsetport;

/// rpcbind program version for the v3/v4 dialect (same procedure numbering
/// as PMAP v2: NULL/SET/UNSET/GETADDR/DUMP map onto 0-4).
pub const RPCBVERS_3: u32 = 3;
pub const RPCBVERS_4: u32 = 4;

/// Key a port-mapping registration is stored under: program, version, and
/// transport protocol. Shared by both the PMAP v2 table and the rpcbind
/// v3/v4 table, since both ultimately resolve to "what port serves this
/// program/version over this transport".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortmapKey {
    pub prog: u32,
    pub vers: u32,
    pub prot: u32,
}

/// Registration table backing both PMAP v2 and rpcbind v3/v4. A single
/// table is shared across dialects since a `(prog, vers, prot)` triple
/// means the same thing in either.
#[derive(Clone, Debug, Default)]
pub struct PortmapTable {
    pub table: HashMap<PortmapKey, u16>,
}

/// Formats a TCP universal address for `127.0.0.1` on `port`, the format
/// rpcbind v3/v4 GETADDR replies with (`h1.h2.h3.h4.p1.p2`, RFC 1833 §3.4).
/// Clients resolve the service on the host they already connected to, so
/// only the port octets carry information here.
pub fn format_uaddr(port: u16) -> String {
    format!("127.0.0.1.{}.{}", port >> 8, port & 0xFF)
}

/// Parses the port octets out of a universal address string, ignoring the
/// host portion.
pub fn parse_uaddr_port(uaddr: &str) -> Option<u16> {
    let mut parts = uaddr.rsplitn(3, '.');
    let lo: u16 = parts.next()?.parse().ok()?;
    let hi: u16 = parts.next()?.parse().ok()?;
    Some((hi << 8) | lo)
}

/// rpcbind v3/v4 mapping record (RFC 1833 §3.2): like PMAP's `mapping` but
/// the protocol and port are folded into string fields (`netid`, `addr`)
/// instead of numeric ones.
#[allow(non_camel_case_types)]
#[derive(Clone, Debug, Default)]
pub struct rpcb {
    pub prog: u32,
    pub vers: u32,
    pub netid: nfsstring,
    pub addr: nfsstring,
    pub owner: nfsstring,
}
DeserializeStruct!(rpcb, prog, vers, netid, addr, owner);
SerializeStruct!(rpcb, prog, vers, netid, addr, owner);

/// Procedure numbers shared by PMAP v2 and rpcbind v3/v4 — both dialects
/// number NULL/SET/UNSET/GETPORT|GETADDR/DUMP identically.
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, FromPrimitive, ToPrimitive)]
pub enum RpcbProcedure {
    NULL = 0,
    SET = 1,
    UNSET = 2,
    GETADDR = 3,
    DUMP = 4,
    CALLIT = 5,
    INVALID,
}
impl SerializeEnum for RpcbProcedure {}
impl DeserializeEnum for RpcbProcedure {}

/// Main handler for the PORTMAP/rpcbind protocol (program 100000).
///
/// Accepts PMAP v2 and rpcbind v3/v4; both share one [`PortmapTable`] since
/// a `(prog, vers, prot)` registration means the same thing in either
/// dialect. `CALLIT` (forwarding a call to another registered service) is
/// not implemented — this server only ever registers itself.
///
/// # Arguments
///
/// * `xid` - RPC transaction ID from the client
/// * `call` - The RPC call body containing program, version, and procedure numbers
/// * `input` - Input stream for reading procedure arguments
/// * `output` - Output stream for writing procedure results
/// * `context` - Server context containing port information
pub fn handle_portmap(
    xid: u32,
    call: xdr::rpc::call_body,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    match call.vers {
        portmap::VERSION => {
            let prog = portmap::PortmapProgram::from_u32(call.proc)
                .unwrap_or(portmap::PortmapProgram::INVALID);
            match prog {
                portmap::PortmapProgram::PMAPPROC_NULL => pmapproc_null(xid, input, output)?,
                portmap::PortmapProgram::PMAPPROC_GETPORT => {
                    pmapproc_getport(xid, input, output, context)?
                }
                portmap::PortmapProgram::PMAPPROC_SET => {
                    pmapproc_setport(xid, input, output, context)?
                }
                portmap::PortmapProgram::PMAPPROC_UNSET => {
                    pmapproc_unsetport(xid, input, output, context)?
                }
                portmap::PortmapProgram::PMAPPROC_DUMP => pmapproc_dump(xid, output, context)?,
                _ => xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?,
            }
        }
        RPCBVERS_3 | RPCBVERS_4 => {
            let proc = RpcbProcedure::from_u32(call.proc).unwrap_or(RpcbProcedure::INVALID);
            match proc {
                RpcbProcedure::NULL => pmapproc_null(xid, input, output)?,
                RpcbProcedure::GETADDR => rpcbproc_getaddr(xid, input, output, context)?,
                _ => xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?,
            }
        }
        other => {
            error!("Unsupported Portmap/rpcbind version {}", other);
            xdr::rpc::prog_mismatch_reply_message(xid, portmap::VERSION).serialize(output)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uaddr_round_trips_port() {
        let uaddr = format_uaddr(2049);
        assert_eq!(parse_uaddr_port(&uaddr), Some(2049));
    }

    #[test]
    fn uaddr_round_trips_high_port() {
        let uaddr = format_uaddr(65535);
        assert_eq!(parse_uaddr_port(&uaddr), Some(65535));
    }
}
