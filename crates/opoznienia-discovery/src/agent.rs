//! Discovery state machine: browsing for peers and answering for ourselves.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use opoznienia_mdns::{
    Answer, DomainName, QType, Query, RecordData, RecordType, ResourceRecord, Response,
    HEADER_LEN,
};
use opoznienia_types::Service;
use tracing::{debug, info};

use crate::error::DiscoveryError;
use crate::DiscoveryEvent;

/// Largest refresh query we send: an Ethernet MTU minus IPv4 and UDP headers,
/// with some slack for tunnels.
pub const REFRESH_QUERY_BUDGET: usize = 1400;

/// QTYPE and QCLASS following the name of a question.
const QUESTION_TRAILER_LEN: usize = 4;

/// Identity this host advertises.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// First label of our instance names, e.g. the host name.
    pub instance: String,
    /// Address put in our A answers.
    pub local_addr: Ipv4Addr,
    /// Whether `_ssh._tcp.local.` is advertised as well.
    pub broadcast_ssh: bool,
    /// TTL in seconds put on every answer we send.
    pub ttl: u32,
}

/// What handling one response produced.
#[derive(Debug, Default)]
pub struct ResponseOutcome {
    /// Registry updates, in answer order.
    pub events: Vec<DiscoveryEvent>,
    /// A query for instance names seen for the first time, to send now.
    pub follow_up: Option<Query>,
}

/// One advertised service: its type and our instance under it.
#[derive(Debug, Clone)]
struct Advertised {
    service_type: DomainName,
    instance: DomainName,
}

/// Browses for delay-probe and SSH services and answers queries for ours.
#[derive(Debug)]
pub struct DiscoveryAgent {
    delay: Advertised,
    ssh: Advertised,
    local_addr: Ipv4Addr,
    broadcast_ssh: bool,
    ttl: u32,
    known_delay: BTreeSet<DomainName>,
    known_ssh: BTreeSet<DomainName>,
}

impl DiscoveryAgent {
    pub fn new(config: AgentConfig) -> Result<Self, DiscoveryError> {
        let advertised = |service: Service| -> Result<Advertised, DiscoveryError> {
            let service_type: DomainName = service.service_type().parse()?;
            let instance = service_type.prepend(&config.instance).map_err(|e| {
                DiscoveryError::InstanceName {
                    name: config.instance.clone(),
                    reason: e.to_string(),
                }
            })?;
            Ok(Advertised {
                service_type,
                instance,
            })
        };

        Ok(Self {
            delay: advertised(Service::Delay)?,
            ssh: advertised(Service::Ssh)?,
            local_addr: config.local_addr,
            broadcast_ssh: config.broadcast_ssh,
            ttl: config.ttl,
            known_delay: BTreeSet::new(),
            known_ssh: BTreeSet::new(),
        })
    }

    /// Our instance name under `service`.
    pub fn instance_name(&self, service: Service) -> &DomainName {
        &self.advertised(service).instance
    }

    /// Instance names learned from PTR answers for `service`.
    pub fn known_names(&self, service: Service) -> &BTreeSet<DomainName> {
        match service {
            Service::Delay => &self.known_delay,
            Service::Ssh => &self.known_ssh,
        }
    }

    /// The periodic PTR query for both service types.
    pub fn browse_query(&self) -> Query {
        Query::for_names(
            RecordType::Ptr,
            [&self.delay.service_type, &self.ssh.service_type],
        )
    }

    /// A queries for every known instance, so TTLs are renewed before they
    /// run out.
    ///
    /// Names are split so that no encoded query exceeds
    /// [`REFRESH_QUERY_BUDGET`] bytes. Empty when nothing is known.
    pub fn refresh_queries(&self) -> Vec<Query> {
        let names: BTreeSet<&DomainName> =
            self.known_delay.iter().chain(&self.known_ssh).collect();
        let mut queries = Vec::new();
        let mut batch: Vec<&DomainName> = Vec::new();
        let mut size = HEADER_LEN;
        for name in names {
            let question_len = name.encoded_len() + QUESTION_TRAILER_LEN;
            if !batch.is_empty() && size + question_len > REFRESH_QUERY_BUDGET {
                queries.push(Query::for_names(RecordType::A, batch.drain(..)));
                size = HEADER_LEN;
            }
            batch.push(name);
            size += question_len;
        }
        if !batch.is_empty() {
            queries.push(Query::for_names(RecordType::A, batch));
        }
        queries
    }

    /// Apply every answer of a response in order.
    ///
    /// A PTR answer for one of the browsed service types records the
    /// instance it points to; an instance seen for the first time is
    /// resolved right away through [`ResponseOutcome::follow_up`]. An A
    /// answer for a known instance becomes a [`DiscoveryEvent`]. Anything
    /// else is ignored.
    pub fn handle_response(&mut self, response: &Response) -> ResponseOutcome {
        let mut outcome = ResponseOutcome::default();
        let mut fresh = Vec::new();

        for answer in &response.answers {
            match answer.record.data() {
                RecordData::Ptr(target) => {
                    let Some(service) = self.service_for_type(&answer.name) else {
                        continue;
                    };
                    if self.known_mut(service).insert(target.clone()) {
                        info!(instance = %target, %service, "discovered instance");
                        fresh.push(target.clone());
                    }
                }
                RecordData::A(addr) => {
                    for service in [Service::Delay, Service::Ssh] {
                        if self.known_names(service).contains(&answer.name) {
                            debug!(instance = %answer.name, %addr, %service, "resolved instance");
                            outcome.events.push(DiscoveryEvent::HostAnnounced {
                                name: answer.name.clone(),
                                addr: *addr,
                                service,
                                ttl: answer.record.ttl(),
                            });
                        }
                    }
                }
            }
        }

        if !fresh.is_empty() {
            outcome.follow_up = Some(Query::for_names(RecordType::A, &fresh));
        }
        outcome
    }

    /// Answer the questions we are authoritative for.
    ///
    /// Returns `None` when nothing applies, so no empty response is sent.
    pub fn answer(&self, query: &Query) -> Option<Response> {
        let mut answers = Vec::new();

        for question in &query.questions {
            match question.qtype {
                QType::PTR => {
                    for service in self.advertised_services() {
                        let adv = self.advertised(service);
                        if question.name == adv.service_type {
                            answers.push(Answer::new(
                                adv.service_type.clone(),
                                ResourceRecord::ptr(self.ttl, adv.instance.clone()),
                            ));
                        }
                    }
                }
                QType::A => {
                    if self.local_addr.is_unspecified() {
                        continue;
                    }
                    for service in self.advertised_services() {
                        let adv = self.advertised(service);
                        if question.name == adv.instance {
                            answers.push(Answer::new(
                                adv.instance.clone(),
                                ResourceRecord::a(self.ttl, self.local_addr),
                            ));
                        }
                    }
                }
                QType::Other(_) => {}
            }
        }

        (!answers.is_empty()).then(|| Response::new(answers))
    }

    /// Update the address used in A answers (e.g. after an interface change).
    pub fn set_local_addr(&mut self, addr: Ipv4Addr) {
        self.local_addr = addr;
    }

    fn advertised(&self, service: Service) -> &Advertised {
        match service {
            Service::Delay => &self.delay,
            Service::Ssh => &self.ssh,
        }
    }

    fn advertised_services(&self) -> impl Iterator<Item = Service> {
        let ssh = self.broadcast_ssh.then_some(Service::Ssh);
        std::iter::once(Service::Delay).chain(ssh)
    }

    fn service_for_type(&self, name: &DomainName) -> Option<Service> {
        [Service::Delay, Service::Ssh]
            .into_iter()
            .find(|s| self.advertised(*s).service_type == *name)
    }

    fn known_mut(&mut self, service: Service) -> &mut BTreeSet<DomainName> {
        match service {
            Service::Delay => &mut self.known_delay,
            Service::Ssh => &mut self.known_ssh,
        }
    }
}
