use ethers::prelude::abigen;

pub mod config;
pub mod error;
pub mod models;

pub mod services {
    pub mod adapter;
    pub mod data_loader;
    pub mod evm;
    pub mod feedback;
    pub mod indexer;
    pub mod logging;
    pub mod near;
    pub mod orchestrator;
    pub mod selector;
    pub mod store;
    pub mod units;

    #[cfg(test)]
    pub mod testing;
}

abigen!(
    NativoMarket,
    r#"[
        function totalSupply() external view returns (uint256)
        function tokensData(uint256 tokenId) external view returns (uint256, uint256, bool, string)
        function ownerOf(uint256 tokenId) external view returns (address)
        function comprarNft(uint256 tokenId) external payable
        function revender(uint256 tokenId, uint256 price) external
    ]"#
);
