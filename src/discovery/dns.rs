// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal, lenient DNS message handling for mDNS service browsing.
//!
//! Dyson devices answer with records a strict parser rejects (bad record
//! lengths, truncated trailers, odd label bytes). Parsing here keeps every
//! record decoded before the first unrecoverable error instead of dropping
//! the whole packet.

use std::net::{IpAddr, Ipv4Addr};

const HEADER_LEN: usize = 12;
const MAX_POINTER_JUMPS: usize = 16;

const TYPE_A: u16 = 1;
const TYPE_PTR: u16 = 12;
const TYPE_TXT: u16 = 16;
const TYPE_SRV: u16 = 33;

const CLASS_IN: u16 = 1;
/// Asks responders to answer by unicast.
const UNICAST_RESPONSE: u16 = 0x8000;

/// Builds a PTR query for a service type such as `_dyson_mqtt._tcp.local.`.
pub(crate) fn build_query(service: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN + service.len() + 6);
    // id 0, standard query, one question
    packet.extend_from_slice(&[0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
    for label in service.split('.').filter(|l| !l.is_empty()) {
        let bytes = &label.as_bytes()[..label.len().min(63)];
        #[allow(clippy::cast_possible_truncation)]
        packet.push(bytes.len() as u8);
        packet.extend_from_slice(bytes);
    }
    packet.push(0);
    packet.extend_from_slice(&TYPE_PTR.to_be_bytes());
    packet.extend_from_slice(&(CLASS_IN | UNICAST_RESPONSE).to_be_bytes());
    packet
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordData {
    Ptr(String),
    Srv { port: u16, target: String },
    A(Ipv4Addr),
    Txt(Vec<String>),
    Other(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub name: String,
    pub data: RecordData,
}

/// A service instance found in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Advertisement {
    pub instance: String,
    pub serial: Option<String>,
    pub address: IpAddr,
    pub port: Option<u16>,
}

/// Extracts the serial from an instance name like
/// `475_NN2-EU-KJA1234A._dyson_mqtt._tcp.local`.
pub(crate) fn serial_from_instance(instance: &str) -> Option<&str> {
    instance
        .split('.')
        .next()?
        .split('_')
        .nth(1)
        .filter(|s| !s.is_empty())
}

/// Parses every answer, authority and additional record it can.
pub(crate) fn parse_records(packet: &[u8]) -> Vec<Record> {
    let mut records = Vec::new();
    if packet.len() < HEADER_LEN {
        return records;
    }

    let count = |at: usize| usize::from(u16::from_be_bytes([packet[at], packet[at + 1]]));
    let questions = count(4);
    let total = count(6) + count(8) + count(10);

    let mut pos = HEADER_LEN;
    for _ in 0..questions {
        let Some((_, next)) = read_name(packet, pos) else {
            return records;
        };
        pos = next + 4;
    }

    for _ in 0..total {
        let Some((name, next)) = read_name(packet, pos) else {
            break;
        };
        let Some(fixed) = packet.get(next..next + 10) else {
            break;
        };
        let kind = u16::from_be_bytes([fixed[0], fixed[1]]);
        let declared = usize::from(u16::from_be_bytes([fixed[8], fixed[9]]));
        let start = next + 10;
        // Trust the declared length only as far as the packet goes.
        let end = (start + declared).min(packet.len());

        records.push(Record {
            name,
            data: parse_data(packet, kind, start, end),
        });

        if end < start + declared {
            break;
        }
        pos = end;
    }

    records
}

fn parse_data(packet: &[u8], kind: u16, start: usize, end: usize) -> RecordData {
    let rdata = &packet[start..end];
    let parsed = match kind {
        TYPE_A => <[u8; 4]>::try_from(rdata).ok().map(|o| RecordData::A(Ipv4Addr::from(o))),
        TYPE_PTR => read_name(packet, start).map(|(target, _)| RecordData::Ptr(target)),
        TYPE_SRV => rdata.get(4..6).and_then(|port| {
            let port = u16::from_be_bytes([port[0], port[1]]);
            read_name(packet, start + 6).map(|(target, _)| RecordData::Srv { port, target })
        }),
        TYPE_TXT => Some(RecordData::Txt(parse_txt(rdata))),
        _ => None,
    };
    parsed.unwrap_or(RecordData::Other(kind))
}

fn parse_txt(rdata: &[u8]) -> Vec<String> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while let Some(&len) = rdata.get(pos) {
        let end = (pos + 1 + usize::from(len)).min(rdata.len());
        entries.push(String::from_utf8_lossy(&rdata[pos + 1..end]).into_owned());
        pos = end;
    }
    entries
}

/// Reads a possibly compressed name. Returns the dotted name (no trailing
/// dot) and the offset just past the name at `start`.
fn read_name(packet: &[u8], start: usize) -> Option<(String, usize)> {
    let mut labels = Vec::new();
    let mut pos = start;
    let mut resume = None;
    let mut jumps = 0;

    loop {
        let len = *packet.get(pos)?;
        match len {
            0 => {
                pos += 1;
                break;
            }
            l if l & 0xC0 == 0xC0 => {
                let low = *packet.get(pos + 1)?;
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return None;
                }
                resume.get_or_insert(pos + 2);
                pos = usize::from(u16::from_be_bytes([l & 0x3F, low]));
            }
            l => {
                let end = pos + 1 + usize::from(l);
                let label = packet.get(pos + 1..end)?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                pos = end;
            }
        }
    }

    Some((labels.join("."), resume.unwrap_or(pos)))
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

fn in_service(name: &str, service: &str) -> bool {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    let service = service.trim_end_matches('.').to_ascii_lowercase();
    name.len() > service.len() && name.ends_with(&format!(".{service}"))
}

/// Collects the service instances announced in a response.
///
/// The address is taken from the A record of the SRV target, then from any
/// A record in the packet, then from the packet's source.
pub(crate) fn advertisements(records: &[Record], service: &str, source: IpAddr) -> Vec<Advertisement> {
    let mut instances: Vec<&str> = Vec::new();
    for record in records {
        let instance = match &record.data {
            RecordData::Ptr(target) if same_name(&record.name, service) => target.as_str(),
            RecordData::Srv { .. } if in_service(&record.name, service) => record.name.as_str(),
            _ => continue,
        };
        if !instances.iter().any(|known| same_name(known, instance)) {
            instances.push(instance);
        }
    }

    let any_address = records.iter().find_map(|r| match r.data {
        RecordData::A(ip) => Some(ip),
        _ => None,
    });

    instances
        .into_iter()
        .map(|instance| {
            let srv = records.iter().find_map(|r| match &r.data {
                RecordData::Srv { port, target } if same_name(&r.name, instance) => {
                    Some((*port, target.as_str()))
                }
                _ => None,
            });
            let target_address = srv.and_then(|(_, target)| {
                records.iter().find_map(|r| match r.data {
                    RecordData::A(ip) if same_name(&r.name, target) => Some(ip),
                    _ => None,
                })
            });
            let address = target_address
                .or(any_address)
                .map_or(source, IpAddr::V4);

            Advertisement {
                instance: instance.to_string(),
                serial: serial_from_instance(instance).map(str::to_string),
                address,
                port: srv.map(|(port, _)| port).filter(|p| *p != 0),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const SERVICE: &str = "_dyson_mqtt._tcp.local.";

    fn push_name(packet: &mut Vec<u8>, name: &str) {
        for label in name.split('.').filter(|l| !l.is_empty()) {
            packet.push(label.len() as u8);
            packet.extend_from_slice(label.as_bytes());
        }
        packet.push(0);
    }

    fn push_record(packet: &mut Vec<u8>, name: &str, kind: u16, rdata: &[u8]) {
        push_name(packet, name);
        packet.extend_from_slice(&kind.to_be_bytes());
        packet.extend_from_slice(&1u16.to_be_bytes());
        packet.extend_from_slice(&120u32.to_be_bytes());
        packet.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        packet.extend_from_slice(rdata);
    }

    /// Response as a Pure Cool Link sends it: PTR, SRV and A records.
    pub(crate) fn response(serial: &str, ip: [u8; 4]) -> Vec<u8> {
        let instance = format!("475_{serial}._dyson_mqtt._tcp.local");
        let host = format!("{serial}.local");

        let mut packet = vec![0, 0, 0x84, 0, 0, 0, 0, 3, 0, 0, 0, 0];

        let mut ptr = Vec::new();
        push_name(&mut ptr, &instance);
        push_record(&mut packet, SERVICE, TYPE_PTR, &ptr);

        let mut srv = vec![0, 0, 0, 0, 0x07, 0x5B];
        push_name(&mut srv, &host);
        push_record(&mut packet, &instance, TYPE_SRV, &srv);

        push_record(&mut packet, &host, TYPE_A, &ip);
        packet
    }

    #[test]
    fn query_layout() {
        let query = build_query(SERVICE);
        assert_eq!(&query[..12], &[0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(query[12], 11);
        assert_eq!(&query[13..24], b"_dyson_mqtt");
        assert_eq!(&query[query.len() - 4..], &[0, 12, 0x80, 1]);
    }

    #[test]
    fn serial_extraction() {
        assert_eq!(
            serial_from_instance("475_NN2-EU-KJA1234A._dyson_mqtt._tcp.local"),
            Some("NN2-EU-KJA1234A")
        );
        assert_eq!(serial_from_instance("no-underscore._dyson_mqtt._tcp.local"), None);
    }

    #[test]
    fn parses_full_response() {
        let packet = response("NN2-EU-KJA1234A", [192, 168, 0, 2]);
        let records = parse_records(&packet);
        assert_eq!(records.len(), 3);

        let found = advertisements(&records, SERVICE, IpAddr::from([10, 0, 0, 1]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].serial.as_deref(), Some("NN2-EU-KJA1234A"));
        assert_eq!(found[0].address, IpAddr::from([192, 168, 0, 2]));
        assert_eq!(found[0].port, Some(1883));
    }

    #[test]
    fn tolerates_truncated_record() {
        let mut packet = response("NN2-EU-KJA1234A", [192, 168, 0, 2]);
        // A record declares 4 bytes but only 2 made it.
        packet.truncate(packet.len() - 2);

        let records = parse_records(&packet);
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].data, RecordData::Other(TYPE_A));

        // No usable A record: fall back to the packet source.
        let found = advertisements(&records, SERVICE, IpAddr::from([10, 0, 0, 9]));
        assert_eq!(found[0].address, IpAddr::from([10, 0, 0, 9]));
    }

    #[test]
    fn compressed_names() {
        let mut packet = vec![0, 0, 0x84, 0, 0, 0, 0, 1, 0, 0, 0, 0];
        let service_at = packet.len();
        push_name(&mut packet, SERVICE);
        packet.extend_from_slice(&TYPE_PTR.to_be_bytes());
        packet.extend_from_slice(&1u16.to_be_bytes());
        packet.extend_from_slice(&120u32.to_be_bytes());
        // "455_SER-1" + pointer to the service name
        let mut rdata = vec![9];
        rdata.extend_from_slice(b"455_SER-1");
        rdata.extend_from_slice(&[0xC0, service_at as u8]);
        packet.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        packet.extend_from_slice(&rdata);

        let records = parse_records(&packet);
        assert_eq!(
            records[0].data,
            RecordData::Ptr("455_SER-1._dyson_mqtt._tcp.local".to_string())
        );
    }

    #[test]
    fn pointer_loop_is_rejected() {
        let mut packet = vec![0, 0, 0x84, 0, 0, 0, 0, 1, 0, 0, 0, 0];
        packet.extend_from_slice(&[0xC0, 12]);
        assert!(parse_records(&packet).is_empty());
    }

    #[test]
    fn short_packet() {
        assert!(parse_records(&[0, 1, 2]).is_empty());
    }
}
