//! AWS backend for Cadence
//!
//! Emits a CloudFormation-shaped template for a scheduled Fargate task:
//! - optional ECR repository
//! - CloudWatch log group, created before the task definition
//! - ECS cluster and Fargate task definition with `environment` and
//!   `secrets` lists
//! - IAM execution, task and events roles scoped to exact ARNs
//! - EventBridge rule + target with explicit network configuration

#![deny(missing_docs)]

pub mod cfn;
pub mod compiler;
pub mod limits;
pub mod target;

pub use compiler::{AwsBackend, AwsResourceGraph};
pub use target::{AwsRoleScope, AwsTarget};
