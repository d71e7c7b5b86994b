//! Marshaller trait and the loose-encoding building blocks shared by every
//! per-type marshaller.

use super::data_stream::{DataInput, DataOutput};
use super::OpenWireFormat;
use crate::commands::{BaseCommand, BaseDataStructure, BrokerError, DataStructure, StackTraceElement};
use crate::error::Error;
use std::any::type_name;
use std::marker::PhantomData;

// ============================================================================
// Marshaller Trait
// ============================================================================

/// Encoder/decoder for one data structure type tag.
///
/// Marshallers write and read only the payload; the type tag in front of it
/// is handled by [`OpenWireFormat`].
pub trait Marshaller: Send + Sync {
    /// The type tag this marshaller is registered under.
    fn data_structure_type(&self) -> u8;

    fn loose_marshal(
        &self,
        wire_format: &OpenWireFormat,
        data: &DataStructure,
        out: &mut DataOutput,
    ) -> Result<(), Error>;

    fn loose_unmarshal(
        &self,
        wire_format: &OpenWireFormat,
        input: &mut DataInput<'_>,
    ) -> Result<DataStructure, Error>;
}

/// Payload codec implemented by every built-in structure.
pub(crate) trait WireType: BaseDataStructure {
    fn loose_marshal(&self, wire_format: &OpenWireFormat, out: &mut DataOutput)
        -> Result<(), Error>;

    /// `type_code` is the tag read from the wire, for types that share one
    /// Rust struct across several tags.
    fn loose_unmarshal(
        type_code: u8,
        wire_format: &OpenWireFormat,
        input: &mut DataInput<'_>,
    ) -> Result<Self, Error>;
}

/// Adapts a [`WireType`] into a registrable [`Marshaller`].
pub(crate) struct TypedMarshaller<T> {
    type_code: u8,
    _marker: PhantomData<fn() -> T>,
}

impl<T: WireType> TypedMarshaller<T> {
    pub(crate) fn new(type_code: u8) -> Self {
        Self {
            type_code,
            _marker: PhantomData,
        }
    }
}

impl<T: WireType> Marshaller for TypedMarshaller<T> {
    fn data_structure_type(&self) -> u8 {
        self.type_code
    }

    fn loose_marshal(
        &self,
        wire_format: &OpenWireFormat,
        data: &DataStructure,
        out: &mut DataOutput,
    ) -> Result<(), Error> {
        let value = T::from_data_structure(data).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "marshaller for type {} cannot encode {}",
                self.type_code,
                type_name::<T>()
            ))
        })?;
        value.loose_marshal(wire_format, out)
    }

    fn loose_unmarshal(
        &self,
        wire_format: &OpenWireFormat,
        input: &mut DataInput<'_>,
    ) -> Result<DataStructure, Error> {
        T::loose_unmarshal(self.type_code, wire_format, input).map(Into::into)
    }
}

// ============================================================================
// Loose Encoding Helpers
// ============================================================================

pub(crate) fn marshal_base_command(base: &BaseCommand, out: &mut DataOutput) {
    out.write_i32(base.command_id);
    out.write_bool(base.response_required);
}

pub(crate) fn unmarshal_base_command(input: &mut DataInput<'_>) -> Result<BaseCommand, Error> {
    Ok(BaseCommand {
        command_id: input.read_i32()?,
        response_required: input.read_bool()?,
    })
}

/// Empty strings travel as absent.
pub(crate) fn marshal_string(value: &str, out: &mut DataOutput) -> Result<(), Error> {
    out.write_bool(!value.is_empty());
    if !value.is_empty() {
        out.write_utf(value)?;
    }
    Ok(())
}

pub(crate) fn unmarshal_string(input: &mut DataInput<'_>) -> Result<String, Error> {
    if input.read_bool()? {
        input.read_utf()
    } else {
        Ok(String::new())
    }
}

/// Empty arrays travel as absent.
pub(crate) fn marshal_byte_array(value: &[u8], out: &mut DataOutput) -> Result<(), Error> {
    out.write_bool(!value.is_empty());
    if !value.is_empty() {
        let len = i32::try_from(value.len())
            .map_err(|_| Error::InvalidArgument(format!("byte array of {} bytes", value.len())))?;
        out.write_i32(len);
        out.write_bytes(value);
    }
    Ok(())
}

pub(crate) fn unmarshal_byte_array(input: &mut DataInput<'_>) -> Result<Vec<u8>, Error> {
    if !input.read_bool()? {
        return Ok(Vec::new());
    }
    let len = input.read_i32()?;
    let len = usize::try_from(len)
        .map_err(|_| Error::malformed(format!("negative byte array length {len}")))?;
    Ok(input.read_bytes(len)?.to_vec())
}

pub(crate) fn marshal_nested<T: WireType>(
    wire_format: &OpenWireFormat,
    value: Option<&T>,
    out: &mut DataOutput,
) -> Result<(), Error> {
    out.write_bool(value.is_some());
    if let Some(value) = value {
        out.write_u8(value.data_structure_type());
        value.loose_marshal(wire_format, out)?;
    }
    Ok(())
}

/// Decodes a nested structure through the registry and checks that it is a `T`.
pub(crate) fn unmarshal_nested<T: WireType>(
    wire_format: &OpenWireFormat,
    input: &mut DataInput<'_>,
) -> Result<Option<T>, Error> {
    let Some(data) = unmarshal_nested_any(wire_format, input)? else {
        return Ok(None);
    };
    T::try_from_data_structure(data).map(Some).map_err(|other| {
        Error::malformed(format!(
            "expected nested {}, found type {}",
            type_name::<T>(),
            other.data_structure_type()
        ))
    })
}

/// Marshals a nested structure of any registered type.
pub(crate) fn marshal_nested_any(
    wire_format: &OpenWireFormat,
    value: Option<&DataStructure>,
    out: &mut DataOutput,
) -> Result<(), Error> {
    out.write_bool(value.is_some());
    if let Some(value) = value {
        wire_format.marshal_by_type(value, out)?;
    }
    Ok(())
}

pub(crate) fn unmarshal_nested_any(
    wire_format: &OpenWireFormat,
    input: &mut DataInput<'_>,
) -> Result<Option<DataStructure>, Error> {
    if !input.read_bool()? {
        return Ok(None);
    }
    let type_code = input.read_u8()?;
    input
        .nested(|input| wire_format.unmarshal_by_type(type_code, input))
        .map(Some)
}

/// Empty arrays travel as absent.
pub(crate) fn marshal_object_array<T: WireType>(
    wire_format: &OpenWireFormat,
    values: &[T],
    out: &mut DataOutput,
) -> Result<(), Error> {
    out.write_bool(!values.is_empty());
    if !values.is_empty() {
        let count = i16::try_from(values.len())
            .map_err(|_| Error::InvalidArgument(format!("array of {} elements", values.len())))?;
        out.write_i16(count);
        for value in values {
            marshal_nested(wire_format, Some(value), out)?;
        }
    }
    Ok(())
}

pub(crate) fn unmarshal_object_array<T: WireType>(
    wire_format: &OpenWireFormat,
    input: &mut DataInput<'_>,
) -> Result<Vec<T>, Error> {
    if !input.read_bool()? {
        return Ok(Vec::new());
    }
    let count = input.read_i16()?;
    let count = usize::try_from(count)
        .map_err(|_| Error::malformed(format!("negative array length {count}")))?;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let value = unmarshal_nested::<T>(wire_format, input)?
            .ok_or_else(|| Error::malformed("null element in object array"))?;
        values.push(value);
    }
    Ok(values)
}

/// Stack traces and causes are only encoded when the connection negotiated
/// stack traces.
pub(crate) fn marshal_broker_error(
    wire_format: &OpenWireFormat,
    error: Option<&BrokerError>,
    out: &mut DataOutput,
) -> Result<(), Error> {
    out.write_bool(error.is_some());
    let Some(error) = error else {
        return Ok(());
    };
    marshal_string(&error.exception_class, out)?;
    marshal_string(&error.message, out)?;
    if wire_format.is_stack_trace_enabled() {
        let count = i16::try_from(error.stack_trace.len()).map_err(|_| {
            Error::InvalidArgument(format!("{} stack trace elements", error.stack_trace.len()))
        })?;
        out.write_i16(count);
        for element in &error.stack_trace {
            marshal_string(&element.class_name, out)?;
            marshal_string(&element.method_name, out)?;
            marshal_string(&element.file_name, out)?;
            out.write_i32(element.line_number);
        }
        marshal_broker_error(wire_format, error.cause.as_deref(), out)?;
    }
    Ok(())
}

pub(crate) fn unmarshal_broker_error(
    wire_format: &OpenWireFormat,
    input: &mut DataInput<'_>,
) -> Result<Option<BrokerError>, Error> {
    if !input.read_bool()? {
        return Ok(None);
    }
    let mut error = BrokerError {
        exception_class: unmarshal_string(input)?,
        message: unmarshal_string(input)?,
        ..Default::default()
    };
    if wire_format.is_stack_trace_enabled() {
        let count = input.read_i16()?;
        let count = usize::try_from(count)
            .map_err(|_| Error::malformed(format!("negative stack trace length {count}")))?;
        for _ in 0..count {
            error.stack_trace.push(StackTraceElement {
                class_name: unmarshal_string(input)?,
                method_name: unmarshal_string(input)?,
                file_name: unmarshal_string(input)?,
                line_number: input.read_i32()?,
            });
        }
        error.cause = input
            .nested(|input| unmarshal_broker_error(wire_format, input))?
            .map(Box::new);
    }
    Ok(Some(error))
}
