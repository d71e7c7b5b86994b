use crate::commands::type_codes;
use crate::commands::{
    BrokerInfo, ConnectionControl, ConnectionError, ConnectionInfo, KeepAliveInfo, ProducerInfo,
    RemoveInfo, Response, ResponseKind, SessionInfo, ShutdownInfo, WireFormatInfo,
};
use crate::error::Error;
use crate::wireformat::data_stream::{DataInput, DataOutput};
use crate::wireformat::marshaller::*;
use crate::wireformat::primitive_types::{marshal_map_to_bytes, unmarshal_map_from_bytes};
use crate::wireformat::OpenWireFormat;

// WireFormatInfo is exchanged before any version is agreed, so its layout
// never changes and it carries no command header.
impl WireType for WireFormatInfo {
    fn loose_marshal(&self, _wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        out.write_bytes(&self.magic);
        out.write_i32(self.version);
        marshal_byte_array(&marshal_map_to_bytes(&self.properties)?, out)
    }

    fn loose_unmarshal(_: u8, _wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        let mut magic = [0u8; WireFormatInfo::MAGIC_SIZE];
        magic.copy_from_slice(input.read_bytes(WireFormatInfo::MAGIC_SIZE)?);
        Ok(Self {
            magic,
            version: input.read_i32()?,
            properties: unmarshal_map_from_bytes(&unmarshal_byte_array(input)?)?,
            ..Default::default()
        })
    }
}

impl WireType for BrokerInfo {
    fn loose_marshal(&self, wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        let version = wf.version();
        marshal_base_command(&self.base, out);
        marshal_nested(wf, self.broker_id.as_ref(), out)?;
        marshal_string(&self.broker_url, out)?;
        marshal_object_array(wf, &self.peer_broker_infos, out)?;
        marshal_string(&self.broker_name, out)?;
        out.write_bool(self.slave_broker);
        out.write_bool(self.master_broker);
        out.write_bool(self.fault_tolerant_configuration);
        if version >= 2 {
            out.write_bool(self.duplex_connection);
            out.write_bool(self.network_connection);
            out.write_i64(self.connection_id);
        }
        if version >= 3 {
            marshal_string(&self.broker_upload_url, out)?;
            marshal_string(&self.network_properties, out)?;
        }
        Ok(())
    }

    fn loose_unmarshal(_: u8, wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        let version = wf.version();
        let mut info = Self {
            base: unmarshal_base_command(input)?,
            broker_id: unmarshal_nested(wf, input)?,
            broker_url: unmarshal_string(input)?,
            peer_broker_infos: unmarshal_object_array(wf, input)?,
            broker_name: unmarshal_string(input)?,
            slave_broker: input.read_bool()?,
            master_broker: input.read_bool()?,
            fault_tolerant_configuration: input.read_bool()?,
            ..Default::default()
        };
        if version >= 2 {
            info.duplex_connection = input.read_bool()?;
            info.network_connection = input.read_bool()?;
            info.connection_id = input.read_i64()?;
        }
        if version >= 3 {
            info.broker_upload_url = unmarshal_string(input)?;
            info.network_properties = unmarshal_string(input)?;
        }
        Ok(info)
    }
}

impl WireType for ConnectionInfo {
    fn loose_marshal(&self, wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        let version = wf.version();
        marshal_base_command(&self.base, out);
        marshal_nested(wf, self.connection_id.as_ref(), out)?;
        marshal_string(&self.client_id, out)?;
        marshal_string(&self.password, out)?;
        marshal_string(&self.user_name, out)?;
        marshal_object_array(wf, &self.broker_path, out)?;
        out.write_bool(self.broker_master_connector);
        out.write_bool(self.manageable);
        if version >= 2 {
            out.write_bool(self.client_master);
        }
        if version >= 6 {
            out.write_bool(self.fault_tolerant);
            out.write_bool(self.failover_reconnect);
        }
        if version >= 8 {
            marshal_string(&self.client_ip, out)?;
        }
        Ok(())
    }

    fn loose_unmarshal(_: u8, wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        let version = wf.version();
        let mut info = Self {
            base: unmarshal_base_command(input)?,
            connection_id: unmarshal_nested(wf, input)?,
            client_id: unmarshal_string(input)?,
            password: unmarshal_string(input)?,
            user_name: unmarshal_string(input)?,
            broker_path: unmarshal_object_array(wf, input)?,
            broker_master_connector: input.read_bool()?,
            manageable: input.read_bool()?,
            ..Default::default()
        };
        if version >= 2 {
            info.client_master = input.read_bool()?;
        }
        if version >= 6 {
            info.fault_tolerant = input.read_bool()?;
            info.failover_reconnect = input.read_bool()?;
        }
        if version >= 8 {
            info.client_ip = unmarshal_string(input)?;
        }
        Ok(info)
    }
}

impl WireType for SessionInfo {
    fn loose_marshal(&self, wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_base_command(&self.base, out);
        marshal_nested(wf, self.session_id.as_ref(), out)
    }

    fn loose_unmarshal(_: u8, wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        Ok(Self {
            base: unmarshal_base_command(input)?,
            session_id: unmarshal_nested(wf, input)?,
        })
    }
}

impl WireType for ProducerInfo {
    fn loose_marshal(&self, wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        let version = wf.version();
        marshal_base_command(&self.base, out);
        marshal_nested(wf, self.producer_id.as_ref(), out)?;
        marshal_nested(wf, self.destination.as_ref(), out)?;
        marshal_object_array(wf, &self.broker_path, out)?;
        if version >= 2 {
            out.write_bool(self.dispatch_async);
        }
        if version >= 3 {
            out.write_i32(self.window_size);
        }
        Ok(())
    }

    fn loose_unmarshal(_: u8, wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        let version = wf.version();
        let mut info = Self {
            base: unmarshal_base_command(input)?,
            producer_id: unmarshal_nested(wf, input)?,
            destination: unmarshal_nested(wf, input)?,
            broker_path: unmarshal_object_array(wf, input)?,
            ..Default::default()
        };
        if version >= 2 {
            info.dispatch_async = input.read_bool()?;
        }
        if version >= 3 {
            info.window_size = input.read_i32()?;
        }
        Ok(info)
    }
}

impl WireType for KeepAliveInfo {
    fn loose_marshal(&self, _wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_base_command(&self.base, out);
        Ok(())
    }

    fn loose_unmarshal(_: u8, _wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        Ok(Self {
            base: unmarshal_base_command(input)?,
        })
    }
}

impl WireType for ShutdownInfo {
    fn loose_marshal(&self, _wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_base_command(&self.base, out);
        Ok(())
    }

    fn loose_unmarshal(_: u8, _wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        Ok(Self {
            base: unmarshal_base_command(input)?,
        })
    }
}

impl WireType for RemoveInfo {
    fn loose_marshal(&self, wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_base_command(&self.base, out);
        marshal_nested_any(wf, self.object_id.as_deref(), out)?;
        if wf.version() >= 5 {
            out.write_i64(self.last_delivered_sequence_id);
        }
        Ok(())
    }

    fn loose_unmarshal(_: u8, wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        let mut info = Self {
            base: unmarshal_base_command(input)?,
            object_id: unmarshal_nested_any(wf, input)?.map(Box::new),
            ..Default::default()
        };
        if wf.version() >= 5 {
            info.last_delivered_sequence_id = input.read_i64()?;
        }
        Ok(info)
    }
}

impl WireType for ConnectionError {
    fn loose_marshal(&self, wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_base_command(&self.base, out);
        marshal_broker_error(wf, self.exception.as_ref(), out)?;
        marshal_nested(wf, self.connection_id.as_ref(), out)
    }

    fn loose_unmarshal(_: u8, wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        Ok(Self {
            base: unmarshal_base_command(input)?,
            exception: unmarshal_broker_error(wf, input)?,
            connection_id: unmarshal_nested(wf, input)?,
        })
    }
}

impl WireType for ConnectionControl {
    fn loose_marshal(&self, wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        let version = wf.version();
        marshal_base_command(&self.base, out);
        out.write_bool(self.close);
        out.write_bool(self.exit);
        out.write_bool(self.fault_tolerant);
        out.write_bool(self.resume);
        out.write_bool(self.suspend);
        if version >= 6 {
            marshal_string(&self.connected_brokers, out)?;
            marshal_string(&self.reconnect_to, out)?;
            out.write_bool(self.rebalance_connection);
        }
        if version >= 8 {
            marshal_byte_array(&self.token, out)?;
        }
        Ok(())
    }

    fn loose_unmarshal(_: u8, wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        let version = wf.version();
        let mut control = Self {
            base: unmarshal_base_command(input)?,
            close: input.read_bool()?,
            exit: input.read_bool()?,
            fault_tolerant: input.read_bool()?,
            resume: input.read_bool()?,
            suspend: input.read_bool()?,
            ..Default::default()
        };
        if version >= 6 {
            control.connected_brokers = unmarshal_string(input)?;
            control.reconnect_to = unmarshal_string(input)?;
            control.rebalance_connection = input.read_bool()?;
        }
        if version >= 8 {
            control.token = unmarshal_byte_array(input)?;
        }
        Ok(control)
    }
}

impl WireType for Response {
    fn loose_marshal(&self, wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_base_command(&self.base, out);
        out.write_i32(self.correlation_id);
        match &self.kind {
            ResponseKind::Plain => Ok(()),
            ResponseKind::Exception(error) => marshal_broker_error(wf, error.as_ref(), out),
            ResponseKind::Data(data) => marshal_nested_any(wf, data.as_deref(), out),
            ResponseKind::Integer(result) => {
                out.write_i32(*result);
                Ok(())
            }
        }
    }

    fn loose_unmarshal(
        type_code: u8,
        wf: &OpenWireFormat,
        input: &mut DataInput<'_>,
    ) -> Result<Self, Error> {
        let base = unmarshal_base_command(input)?;
        let correlation_id = input.read_i32()?;
        let kind = match type_code {
            type_codes::RESPONSE => ResponseKind::Plain,
            type_codes::EXCEPTION_RESPONSE => {
                ResponseKind::Exception(unmarshal_broker_error(wf, input)?)
            }
            type_codes::DATA_RESPONSE => {
                ResponseKind::Data(unmarshal_nested_any(wf, input)?.map(Box::new))
            }
            type_codes::INTEGER_RESPONSE => ResponseKind::Integer(input.read_i32()?),
            other => return Err(Error::UnknownDataType(other)),
        };
        Ok(Self {
            base,
            correlation_id,
            kind,
        })
    }
}
