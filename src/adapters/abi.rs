use alloy::sol_types::SolCall;
use std::collections::HashMap;
use crate::error::DecodeError;

pub use alloy::primitives::{Address, Selector};

alloy::sol! {
    interface IBountyFactory {
        function createBounty(string identifier) external;
    }

    interface IBounty {
        function assignReward(string username) external;
        function reward(address destination) external;
    }
}

pub use IBounty::{assignRewardCall, rewardCall};
pub use IBountyFactory::createBountyCall;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    Str(String),
    Address(Address),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    pub selector: Selector,
    pub args: Vec<CallArg>,
}

impl DecodedCall {
    pub fn first_str(&self) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg {
            CallArg::Str(s) => Some(s.as_str()),
            CallArg::Address(_) => None,
        })
    }
}

/// Turns raw call data into structured arguments.
pub trait CallDecoder: Send + Sync {
    fn decode(&self, input: &str) -> Result<DecodedCall, DecodeError>;
}

/// The three calls the bounty contracts expose. Defaults are the selectors
/// of the `sol!` signatures above; a deployment may override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BountySelectors {
    pub create_bounty: Selector,
    pub assign_reward: Selector,
    pub reward: Selector,
}

impl Default for BountySelectors {
    fn default() -> Self {
        Self {
            create_bounty: Selector::new(createBountyCall::SELECTOR),
            assign_reward: Selector::new(assignRewardCall::SELECTOR),
            reward: Selector::new(rewardCall::SELECTOR),
        }
    }
}

impl BountySelectors {
    pub fn encode_create_bounty(&self, identifier: &str) -> String {
        encode_call(
            self.create_bounty,
            &createBountyCall {
                identifier: identifier.to_string(),
            },
        )
    }

    pub fn encode_assign_reward(&self, username: &str) -> String {
        encode_call(
            self.assign_reward,
            &assignRewardCall {
                username: username.to_string(),
            },
        )
    }

    pub fn encode_reward(&self, destination: &str) -> Result<String, DecodeError> {
        let destination: Address = destination
            .parse()
            .map_err(|e| DecodeError::CallData(format!("address {}: {}", destination, e)))?;
        Ok(encode_call(self.reward, &rewardCall { destination }))
    }
}

/// `0x`-prefixed call data: `selector` followed by the ABI-encoded arguments.
pub fn encode_call<C: SolCall>(selector: Selector, call: &C) -> String {
    let mut data = selector.to_vec();
    call.abi_encode_raw(&mut data);
    format!("0x{}", hex::encode(data))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BountyCall {
    CreateBounty,
    AssignReward,
    Reward,
}

/// Decodes the bounty calls, keyed by their configured selectors.
#[derive(Debug, Clone)]
pub struct AbiDecoder {
    calls: HashMap<Selector, BountyCall>,
}

impl AbiDecoder {
    pub fn for_bounties(selectors: &BountySelectors) -> Self {
        Self {
            calls: HashMap::from([
                (selectors.create_bounty, BountyCall::CreateBounty),
                (selectors.assign_reward, BountyCall::AssignReward),
                (selectors.reward, BountyCall::Reward),
            ]),
        }
    }
}

fn call_data(e: alloy::sol_types::Error) -> DecodeError {
    DecodeError::CallData(e.to_string())
}

impl CallDecoder for AbiDecoder {
    fn decode(&self, input: &str) -> Result<DecodedCall, DecodeError> {
        let bytes = hex::decode(input.strip_prefix("0x").unwrap_or(input))
            .map_err(|e| DecodeError::CallData(e.to_string()))?;
        if bytes.len() < 4 {
            return Err(DecodeError::CallData(format!(
                "{} bytes is too short for a selector",
                bytes.len()
            )));
        }

        let (head, body) = bytes.split_at(4);
        let selector = Selector::from_slice(head);
        let kind = self
            .calls
            .get(&selector)
            .ok_or_else(|| DecodeError::UnknownSelector(selector.to_string()))?;

        let arg = match kind {
            BountyCall::CreateBounty => {
                CallArg::Str(createBountyCall::abi_decode_raw(body).map_err(call_data)?.identifier)
            }
            BountyCall::AssignReward => {
                CallArg::Str(assignRewardCall::abi_decode_raw(body).map_err(call_data)?.username)
            }
            BountyCall::Reward => {
                CallArg::Address(rewardCall::abi_decode_raw(body).map_err(call_data)?.destination)
            }
        };

        Ok(DecodedCall {
            selector,
            args: vec![arg],
        })
    }
}

/// Compares two hex addresses by value, so checksummed and lowercase forms
/// agree. Anything that is not an address matches nothing.
pub fn same_address(a: &str, b: &str) -> bool {
    match (a.parse::<Address>(), b.parse::<Address>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
