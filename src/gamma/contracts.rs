use alloy::sol;

sol!(
    #[derive(Debug)]
    #[sol(rpc)]
    interface IHypervisor {
        function pool() external view returns (address);
        function currentTick() external view returns (int24);

        function baseLower() external view returns (int24);
        function baseUpper() external view returns (int24);
        function limitLower() external view returns (int24);
        function limitUpper() external view returns (int24);

        function getBasePosition()
            external
            view
            returns (uint128 liquidity, uint256 amount0, uint256 amount1);
        function getLimitPosition()
            external
            view
            returns (uint128 liquidity, uint256 amount0, uint256 amount1);
        function getTotalAmounts() external view returns (uint256 total0, uint256 total1);
    }
);
