use super::{
    BrokerInfo, Command, ConnectionControl, ConnectionError, ConnectionInfo, KeepAliveInfo,
    ProducerInfo, RemoveInfo, Response, SessionInfo, ShutdownInfo, WireFormatInfo,
};
use crate::error::Error;

/// Double-dispatch target for [`Command::visit`].
///
/// Each method handles one concrete command and may return a command to send
/// back. Every method defaults to doing nothing, so implementors override only
/// the commands they care about.
pub trait CommandVisitor {
    fn process_wire_format_info(&mut self, _info: &WireFormatInfo) -> Result<Option<Command>, Error> {
        Ok(None)
    }

    fn process_broker_info(&mut self, _info: &BrokerInfo) -> Result<Option<Command>, Error> {
        Ok(None)
    }

    fn process_connection_info(&mut self, _info: &ConnectionInfo) -> Result<Option<Command>, Error> {
        Ok(None)
    }

    fn process_session_info(&mut self, _info: &SessionInfo) -> Result<Option<Command>, Error> {
        Ok(None)
    }

    fn process_producer_info(&mut self, _info: &ProducerInfo) -> Result<Option<Command>, Error> {
        Ok(None)
    }

    fn process_keep_alive_info(&mut self, _info: &KeepAliveInfo) -> Result<Option<Command>, Error> {
        Ok(None)
    }

    fn process_shutdown_info(&mut self, _info: &ShutdownInfo) -> Result<Option<Command>, Error> {
        Ok(None)
    }

    fn process_remove_info(&mut self, _info: &RemoveInfo) -> Result<Option<Command>, Error> {
        Ok(None)
    }

    fn process_connection_error(
        &mut self,
        _error: &ConnectionError,
    ) -> Result<Option<Command>, Error> {
        Ok(None)
    }

    fn process_connection_control(
        &mut self,
        _control: &ConnectionControl,
    ) -> Result<Option<Command>, Error> {
        Ok(None)
    }

    fn process_response(&mut self, _response: &Response) -> Result<Option<Command>, Error> {
        Ok(None)
    }
}
