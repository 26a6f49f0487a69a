use std::net::IpAddr;

use super::registry::FunctionRegistryBuilder;
use super::types::{str_arg, FunctionError, FunctionResult, ParamType, Signature};
use crate::eval::{EvaluationContext, Value, ValueKind};

pub(crate) fn register(builder: &mut FunctionRegistryBuilder) {
    builder.native(
        Signature::new("cidr")
            .param("cidr", ParamType::String)
            .param("ip", ParamType::String)
            .returns(ValueKind::Bool),
        cidr,
    );
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Network {
    addr: IpAddr,
    prefix: u8,
}

impl Network {
    fn parse(s: &str) -> Result<Self, String> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("invalid CIDR address: {}", s))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid CIDR address: {}", s))?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = prefix
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= max)
            .ok_or_else(|| format!("invalid CIDR address: {}", s))?;
        Ok(Self { addr, prefix })
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            (IpAddr::V4(_), IpAddr::V6(ip)) => ip
                .to_ipv4_mapped()
                .map(|v4| self.contains(IpAddr::V4(v4)))
                .unwrap_or(false),
            (IpAddr::V6(_), IpAddr::V4(_)) => false,
        }
    }
}

fn cidr(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let network =
        Network::parse(str_arg(args, 0)?).map_err(|reason| FunctionError::argument(0, reason))?;
    // only the block is validated; an unparsable address is simply outside it
    let inside = str_arg(args, 1)?
        .trim()
        .parse::<IpAddr>()
        .map(|ip| network.contains(ip))
        .unwrap_or(false);
    Ok(Value::Boolean(inside))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{call, context};
    use super::*;

    fn cidr(block: &str, ip: &str) -> Result<Value, crate::eval::EvalError> {
        call(&context(), "cidr", vec![Value::from(block), Value::from(ip)])
    }

    #[test]
    fn test_ipv4_membership() {
        assert_eq!(cidr("10.0.0.0/8", "10.1.2.3"), Ok(Value::Boolean(true)));
        assert_eq!(cidr("10.0.0.0/8", "192.168.1.1"), Ok(Value::Boolean(false)));
        assert_eq!(cidr("192.168.1.7/32", "192.168.1.7"), Ok(Value::Boolean(true)));
        assert_eq!(cidr("0.0.0.0/0", "8.8.8.8"), Ok(Value::Boolean(true)));
        // host bits in the block are ignored
        assert_eq!(cidr("10.9.9.9/8", "10.0.0.1"), Ok(Value::Boolean(true)));
    }

    #[test]
    fn test_ipv6_membership() {
        assert_eq!(cidr("2001:db8::/32", "2001:db8::1"), Ok(Value::Boolean(true)));
        assert_eq!(cidr("2001:db8::/32", "2001:db9::1"), Ok(Value::Boolean(false)));
        assert_eq!(cidr("10.0.0.0/8", "::ffff:10.0.0.1"), Ok(Value::Boolean(true)));
        assert_eq!(cidr("2001:db8::/32", "10.0.0.1"), Ok(Value::Boolean(false)));
    }

    #[test]
    fn test_malformed_block_fails() {
        for block in ["not-a-cidr", "10.0.0.0", "10.0.0.0/33", "10.0.0/8", "::/129"] {
            let result = cidr(block, "1.2.3.4");
            assert!(result.is_err(), "{} should be rejected", block);
        }
    }

    #[test]
    fn test_malformed_address_is_outside() {
        assert_eq!(cidr("10.0.0.0/8", "garbage"), Ok(Value::Boolean(false)));
        assert_eq!(cidr("10.0.0.0/8", ""), Ok(Value::Boolean(false)));
    }
}
