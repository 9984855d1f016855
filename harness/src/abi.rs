//! Solidity interfaces of the contracts the harness talks to.
//!
//! The vault and elastic interfaces only list what they add on top of
//! [`IERC20`]; a deployed token implements the union.

use alloy_sol_types::sol;

sol! {
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface IVaultToken {
        function reserveToken() external view returns (address);
        function totalReserve() external view returns (uint256);
        function deposit(uint256 cost) external;
        function withdraw(uint256 grossShares) external;
    }

    interface IElasticToken {
        function referenceToken() external view returns (address);
        function scalingFactor() external view returns (uint256);
        function lastExchangeRate() external view returns (uint256);
        function currentExchangeRate() external view returns (uint256);
        function rebaseAvailable() external view returns (bool);
        function rebase() external;
        function setRebaseMinimumDeviation(uint256 minimumDeviation) external;
        function setRebaseDampeningFactor(uint256 dampeningFactor) external;
        function setRebaseTreasuryMintPercent(uint256 treasuryMintPercent) external;
        function setRebaseTimingParameters(uint256 minimumInterval, uint256 windowOffset, uint256 windowLength) external;
    }

    interface IExchange {
        function faucet(address token, uint256 amount) external payable;
        function direct(address from, address to, uint256 amount) external;
    }
}
