pub mod mocks;

mod relay;
