use crate::commands::{
    ActiveMQDestination, BrokerId, ConnectionId, ConsumerId, DestinationType, MessageId,
    ProducerId, SessionId,
};
use crate::error::Error;
use crate::wireformat::data_stream::{DataInput, DataOutput};
use crate::wireformat::marshaller::{
    marshal_nested, marshal_string, unmarshal_nested, unmarshal_string, WireType,
};
use crate::wireformat::OpenWireFormat;

impl WireType for ConnectionId {
    fn loose_marshal(&self, _wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_string(&self.value, out)
    }

    fn loose_unmarshal(_: u8, _wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        Ok(Self {
            value: unmarshal_string(input)?,
        })
    }
}

impl WireType for SessionId {
    fn loose_marshal(&self, _wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_string(&self.connection_id, out)?;
        out.write_i64(self.value);
        Ok(())
    }

    fn loose_unmarshal(_: u8, _wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        Ok(Self {
            connection_id: unmarshal_string(input)?,
            value: input.read_i64()?,
        })
    }
}

// Field order on the wire is connection, value, session.
impl WireType for ProducerId {
    fn loose_marshal(&self, _wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_string(&self.connection_id, out)?;
        out.write_i64(self.value);
        out.write_i64(self.session_id);
        Ok(())
    }

    fn loose_unmarshal(_: u8, _wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        Ok(Self {
            connection_id: unmarshal_string(input)?,
            value: input.read_i64()?,
            session_id: input.read_i64()?,
        })
    }
}

impl WireType for ConsumerId {
    fn loose_marshal(&self, _wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_string(&self.connection_id, out)?;
        out.write_i64(self.session_id);
        out.write_i64(self.value);
        Ok(())
    }

    fn loose_unmarshal(_: u8, _wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        Ok(Self {
            connection_id: unmarshal_string(input)?,
            session_id: input.read_i64()?,
            value: input.read_i64()?,
        })
    }
}

impl WireType for BrokerId {
    fn loose_marshal(&self, _wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_string(&self.value, out)
    }

    fn loose_unmarshal(_: u8, _wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        Ok(Self {
            value: unmarshal_string(input)?,
        })
    }
}

impl WireType for MessageId {
    fn loose_marshal(&self, wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_nested(wf, self.producer_id(), out)?;
        out.write_i64(self.producer_sequence_id());
        out.write_i64(self.broker_sequence_id());
        Ok(())
    }

    fn loose_unmarshal(_: u8, wf: &OpenWireFormat, input: &mut DataInput<'_>) -> Result<Self, Error> {
        let mut id = MessageId::default();
        id.set_producer_id(unmarshal_nested(wf, input)?);
        id.set_producer_sequence_id(input.read_i64()?);
        id.set_broker_sequence_id(input.read_i64()?);
        Ok(id)
    }
}

impl WireType for ActiveMQDestination {
    fn loose_marshal(&self, _wf: &OpenWireFormat, out: &mut DataOutput) -> Result<(), Error> {
        marshal_string(&self.physical_name, out)
    }

    fn loose_unmarshal(
        type_code: u8,
        _wf: &OpenWireFormat,
        input: &mut DataInput<'_>,
    ) -> Result<Self, Error> {
        let destination_type = DestinationType::from_data_structure_type(type_code)
            .ok_or(Error::UnknownDataType(type_code))?;
        Ok(ActiveMQDestination::new(
            destination_type,
            unmarshal_string(input)?,
        ))
    }
}
