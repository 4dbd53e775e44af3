//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use iccp_utils::task::Task;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{Sender, UnboundedSender};

use crate::collections::{CsmId, Interfaces};
use crate::debug::Debug;
use crate::error::Error;
use crate::mlacp::Mlacp;
use crate::network::TcpConnInfo;
use crate::packet::messages::notification::{NakMsg, StatusCode, TlvStatus};
use crate::packet::messages::{HeartbeatMsg, TlvHeartbeat, TlvWarmboot, WarmbootMsg};
use crate::packet::{Message, MessageType};
use crate::tasks;
use crate::tasks::messages::input::{CsmRxMsg, TcpConnectMsg};
use crate::tasks::messages::output::CsmTxMsg;

// Rate limit for outgoing connection attempts.
pub(crate) const CONNECT_INTERVAL_SEC: u64 = 2;
// Default heartbeat cadence and dead-peer timeout.
pub(crate) const HEARTBEAT_INTERVAL_SEC: u64 = 1;
pub(crate) const HEARTBEAT_TIMEOUT_SEC: u64 = 15;
// Size of the sent-message ring used for NAK correlation.
const MSG_LOG_SIZE: usize = 128;

// Connection state machine of one MLAG domain.
#[derive(Debug)]
pub struct Csm {
    pub id: CsmId,
    pub domain_id: u16,
    pub local_addr: Ipv4Addr,
    pub peer_addr: Ipv4Addr,
    pub peer_link: Option<String>,
    pub state: fsm::State,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub conn_info: Option<TcpConnInfo>,
    pub last_connect: Option<Instant>,
    pub last_heartbeat_rx: Instant,
    pub last_heartbeat_tx: Instant,
    // Ring of sent (msg_id, msg_type) pairs for NAK correlation.
    pub msg_log: VecDeque<(u32, MessageType)>,
    pub mlacp: Mlacp,
    pub msg_id: Arc<AtomicU32>,
    pub msg_txp: Option<UnboundedSender<CsmTxMsg>>,
    pub tasks: CsmTasks,
}

#[derive(Debug, Default)]
pub struct CsmTasks {
    pub connect: Option<Task<()>>,
    pub tcp_rx: Option<Task<()>>,
    pub tcp_tx: Option<Task<()>>,
}

// CSM states and events.
pub mod fsm {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        NonExistent,
        Connecting,
        Listening,
        Established,
        Operational,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        StartConnect,
        StartListen,
        ConnectionUp,
        ExchangeDone,
        ConnectionDown,
        HeartbeatTimeout,
        Reconfigure,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum Action {
        // Begin the MLACP exchange.
        StartSession,
        // Tear down the session state.
        Reset,
    }

    // Transition table. `None` means the event isn't valid in the given
    // state.
    pub(crate) fn apply(
        state: State,
        event: Event,
    ) -> Option<(State, Option<Action>)> {
        match (state, event) {
            (State::NonExistent, Event::StartConnect) => {
                Some((State::Connecting, None))
            }
            (State::NonExistent, Event::StartListen) => {
                Some((State::Listening, None))
            }
            (State::Connecting | State::Listening, Event::ConnectionUp) => {
                Some((State::Established, Some(Action::StartSession)))
            }
            (State::Established, Event::ExchangeDone) => {
                Some((State::Operational, None))
            }
            (
                State::Connecting
                | State::Listening
                | State::Established
                | State::Operational,
                Event::ConnectionDown
                | Event::HeartbeatTimeout
                | Event::Reconfigure,
            ) => Some((State::NonExistent, Some(Action::Reset))),
            (State::NonExistent, Event::Reconfigure) => {
                Some((State::NonExistent, None))
            }
            _ => None,
        }
    }
}

// ===== impl Csm =====

impl Csm {
    pub(crate) fn new(
        id: CsmId,
        domain_id: u16,
        local_addr: Ipv4Addr,
        peer_addr: Ipv4Addr,
    ) -> Csm {
        Debug::CsmCreate(&peer_addr).log();

        Csm {
            id,
            domain_id,
            local_addr,
            peer_addr,
            peer_link: None,
            state: fsm::State::NonExistent,
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SEC),
            heartbeat_timeout: Duration::from_secs(HEARTBEAT_TIMEOUT_SEC),
            conn_info: None,
            last_connect: None,
            last_heartbeat_rx: Instant::now(),
            last_heartbeat_tx: Instant::now(),
            msg_log: VecDeque::with_capacity(MSG_LOG_SIZE),
            mlacp: Mlacp::new(local_addr, peer_addr),
            msg_id: Arc::new(AtomicU32::new(1)),
            msg_txp: None,
            tasks: Default::default(),
        }
    }

    // Applies a state machine event, logging the transition. Unexpected
    // events are logged and ignored.
    pub(crate) fn fsm_event(&mut self, event: fsm::Event) -> Option<fsm::Action> {
        let Some((new_state, action)) = fsm::apply(self.state, event) else {
            Error::CsmFsmUnexpectedEvent(self.peer_addr, self.state, event)
                .log();
            return None;
        };

        if new_state != self.state {
            Debug::CsmFsmTransition(
                &self.peer_addr,
                &event,
                &self.state,
                &new_state,
            )
            .log();
            self.state = new_state;
        }

        action
    }

    // Session configuration is complete once both addresses are known and
    // the configured peer-link resolves to a known interface.
    pub(crate) fn config_complete(&self, interfaces: &Interfaces) -> bool {
        if self.local_addr.is_unspecified()
            || self.peer_addr.is_unspecified()
        {
            return false;
        }
        match &self.peer_link {
            Some(peer_link) => interfaces
                .get_by_name(peer_link)
                .is_some_and(|(_, iface)| !iface.purged),
            None => true,
        }
    }

    // Only the numerically lower address initiates the connection. Equal
    // addresses are a configuration error and the session never forms.
    pub(crate) fn is_initiator(&self) -> Result<bool, Error> {
        if self.local_addr == self.peer_addr {
            return Err(Error::CsmEqualPeerAddr(self.peer_addr));
        }
        Ok(self.local_addr < self.peer_addr)
    }

    // Spawns a rate-limited connection attempt.
    pub(crate) fn connect(&mut self, tcp_connectp: &Sender<TcpConnectMsg>) {
        if let Some(last_connect) = self.last_connect {
            if last_connect.elapsed()
                < Duration::from_secs(CONNECT_INTERVAL_SEC)
            {
                return;
            }
        }
        self.last_connect = Some(Instant::now());

        let task = tasks::tcp_connect(self, tcp_connectp);
        self.tasks.connect = Some(task);
    }

    // Attaches an established connection to the session, spawning the
    // per-connection rx/tx tasks.
    pub(crate) fn session_up(
        &mut self,
        stream: TcpStream,
        conn_info: TcpConnInfo,
        msg_rxp: &Sender<CsmRxMsg>,
    ) {
        let (read_half, write_half) = stream.into_split();

        let (tcp_rx, tcp_tx, msg_txp) =
            tasks::csm_session_tasks(self, read_half, write_half, msg_rxp);

        self.conn_info = Some(conn_info);
        self.msg_txp = Some(msg_txp);
        self.tasks.connect = None;
        self.tasks.tcp_rx = Some(tcp_rx);
        self.tasks.tcp_tx = Some(tcp_tx);
        self.last_heartbeat_rx = Instant::now();
        self.last_heartbeat_tx = Instant::now();
    }

    // Tears down all session state. Dropping the task handles deregisters
    // the connection; no timers or callbacks survive the disconnect.
    pub(crate) fn session_down(&mut self) {
        self.tasks = Default::default();
        self.msg_txp = None;
        self.conn_info = None;
        self.msg_log.clear();
        self.mlacp.reset();
    }

    pub(crate) fn get_next_msg_id(&self) -> u32 {
        self.msg_id.fetch_add(1, Ordering::Relaxed)
    }

    // Sends a message over the session, recording it in the message log
    // for NAK correlation.
    pub(crate) fn send_message(&mut self, msg: Message, flush: bool) {
        Debug::CsmMsgTx(&self.peer_addr, &msg).log();

        if self.msg_log.len() == MSG_LOG_SIZE {
            self.msg_log.pop_front();
        }
        self.msg_log.push_back((msg.msg_id(), msg.msg_type()));

        if let Some(msg_txp) = &self.msg_txp {
            let _ = msg_txp.send(CsmTxMsg { msg, flush });
        }
    }

    // Looks up a sent message by ID for NAK correlation.
    pub(crate) fn msg_log_find(&self, msg_id: u32) -> Option<MessageType> {
        self.msg_log
            .iter()
            .find(|(id, _)| *id == msg_id)
            .map(|(_, msg_type)| *msg_type)
    }

    pub(crate) fn send_nak(
        &mut self,
        rejected: (u16, u32),
        status: StatusCode,
    ) {
        let (rej_msg_type, rej_msg_id) = rejected;
        let msg = NakMsg::new(
            self.get_next_msg_id(),
            TlvStatus::new(status, rej_msg_id, rej_msg_type),
        );
        Error::CsmSentNak(self.peer_addr, status).log();
        self.send_message(msg.into(), true);
    }

    // Emits a heartbeat when the cadence elapsed.
    pub(crate) fn send_heartbeat(&mut self) {
        if self.last_heartbeat_tx.elapsed() < self.heartbeat_interval {
            return;
        }
        self.last_heartbeat_tx = Instant::now();

        let msg = HeartbeatMsg::new(
            self.get_next_msg_id(),
            TlvHeartbeat::new(self.mlacp.node_id),
        );
        self.send_message(msg.into(), true);
    }

    pub(crate) fn send_warmboot(&mut self) {
        let msg = WarmbootMsg::new(
            self.get_next_msg_id(),
            TlvWarmboot::new(true),
        );
        self.send_message(msg.into(), true);
    }

    pub(crate) fn heartbeat_timed_out(&self) -> bool {
        self.last_heartbeat_rx.elapsed() > self.heartbeat_timeout
    }
}

impl Drop for Csm {
    fn drop(&mut self) {
        Debug::CsmDelete(&self.peer_addr).log();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::InterfaceType;

    fn test_csm(local: [u8; 4], peer: [u8; 4]) -> Csm {
        Csm::new(1, 1, Ipv4Addr::from(local), Ipv4Addr::from(peer))
    }

    #[test]
    fn test_fsm_transitions() {
        use fsm::{apply, Action, Event, State};

        assert_eq!(
            apply(State::NonExistent, Event::StartConnect),
            Some((State::Connecting, None))
        );
        assert_eq!(
            apply(State::NonExistent, Event::StartListen),
            Some((State::Listening, None))
        );
        assert_eq!(
            apply(State::Connecting, Event::ConnectionUp),
            Some((State::Established, Some(Action::StartSession)))
        );
        assert_eq!(
            apply(State::Listening, Event::ConnectionUp),
            Some((State::Established, Some(Action::StartSession)))
        );
        assert_eq!(
            apply(State::Established, Event::ExchangeDone),
            Some((State::Operational, None))
        );
        assert_eq!(
            apply(State::Operational, Event::HeartbeatTimeout),
            Some((State::NonExistent, Some(Action::Reset)))
        );
        assert_eq!(
            apply(State::Established, Event::ConnectionDown),
            Some((State::NonExistent, Some(Action::Reset)))
        );
        assert_eq!(
            apply(State::Operational, Event::Reconfigure),
            Some((State::NonExistent, Some(Action::Reset)))
        );
        assert_eq!(
            apply(State::NonExistent, Event::Reconfigure),
            Some((State::NonExistent, None))
        );

        // Events that aren't valid in the given state.
        assert_eq!(apply(State::NonExistent, Event::ConnectionUp), None);
        assert_eq!(apply(State::Operational, Event::ConnectionUp), None);
        assert_eq!(apply(State::Connecting, Event::ExchangeDone), None);
    }

    #[test]
    fn test_is_initiator() {
        // The numerically lower address initiates.
        let csm = test_csm([10, 0, 0, 1], [10, 0, 0, 2]);
        assert!(csm.is_initiator().unwrap());

        let csm = test_csm([10, 0, 0, 2], [10, 0, 0, 1]);
        assert!(!csm.is_initiator().unwrap());

        // Equal addresses are a configuration error.
        let csm = test_csm([10, 0, 0, 1], [10, 0, 0, 1]);
        assert!(matches!(
            csm.is_initiator(),
            Err(Error::CsmEqualPeerAddr(_))
        ));
    }

    #[test]
    fn test_config_complete() {
        let mut interfaces = crate::collections::Interfaces::default();

        let csm = test_csm([0, 0, 0, 0], [10, 0, 0, 2]);
        assert!(!csm.config_complete(&interfaces));

        // No peer-link configured.
        let csm = test_csm([10, 0, 0, 1], [10, 0, 0, 2]);
        assert!(csm.config_complete(&interfaces));

        // Configured peer-link must resolve to a known interface.
        let mut csm = test_csm([10, 0, 0, 1], [10, 0, 0, 2]);
        csm.peer_link = Some("PortChannel100".to_owned());
        assert!(!csm.config_complete(&interfaces));
        interfaces.insert("PortChannel100", InterfaceType::PortChannel);
        assert!(csm.config_complete(&interfaces));
    }

    #[test]
    fn test_msg_log_ring() {
        let mut csm = test_csm([10, 0, 0, 1], [10, 0, 0, 2]);

        for _ in 0..MSG_LOG_SIZE + 1 {
            let msg = HeartbeatMsg::new(
                csm.get_next_msg_id(),
                TlvHeartbeat::new(0),
            );
            csm.send_message(msg.into(), false);
        }

        // The oldest entry was evicted.
        assert_eq!(csm.msg_log.len(), MSG_LOG_SIZE);
        assert_eq!(csm.msg_log_find(1), None);
        assert_eq!(csm.msg_log_find(2), Some(MessageType::Heartbeat));
        assert_eq!(
            csm.msg_log_find(MSG_LOG_SIZE as u32 + 1),
            Some(MessageType::Heartbeat)
        );
    }

    #[test]
    fn test_heartbeat_timeout() {
        let mut csm = test_csm([10, 0, 0, 1], [10, 0, 0, 2]);
        assert!(!csm.heartbeat_timed_out());

        csm.last_heartbeat_rx = Instant::now()
            .checked_sub(Duration::from_secs(HEARTBEAT_TIMEOUT_SEC + 1))
            .unwrap();
        assert!(csm.heartbeat_timed_out());
    }

    #[test]
    fn test_session_down_clears_state() {
        let mut csm = test_csm([10, 0, 0, 1], [10, 0, 0, 2]);

        let msg = HeartbeatMsg::new(
            csm.get_next_msg_id(),
            TlvHeartbeat::new(0),
        );
        csm.send_message(msg.into(), false);
        csm.mlacp.advance(crate::mlacp::fsm::State::SysConfigExchange);

        csm.session_down();
        assert!(csm.msg_log.is_empty());
        assert_eq!(csm.mlacp.state, crate::mlacp::fsm::State::Init);
    }
}
