//! Implementation of the rpcbind v3/v4 GETADDR procedure (procedure 3).
//!
//! Where PMAP v2 GETPORT answers with a bare port number, rpcbind answers
//! with a universal address string (`h1.h2.h3.h4.p1.p2` for IPv4), per the
//! address format used by `mount.nfs`'s rpcbind v3/v4 fallback path.
//!
//! Like `get_port::pmapproc_getport`, this always points back at the port
//! the connection was accepted on rather than consulting the registration
//! table, since every service this crate exposes shares one listener.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, Deserialize, Serialize};

use super::{format_uaddr, rpcb};

pub fn rpcbproc_getaddr(
    xid: u32,
    read: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let mut request = rpcb::default();
    request.deserialize(read)?;
    debug!("rpcbproc_getaddr({:?}, {:?})", xid, request);

    let uaddr = format_uaddr(context.local_port);
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    xdr::nfs3::nfsstring::from(uaddr.into_bytes()).serialize(output)?;
    Ok(())
}
