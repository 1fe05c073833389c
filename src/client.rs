use crate::ui::{
    self,
    UiState,
    UserEvent,
    View,
};
use color_eyre::eyre::Result;
use ethers::signers::LocalWallet;
use spin_wager::{
    broadcast::Broadcaster,
    chain::{
        ChainReader,
        NetworkEligibility,
    },
    config::NetworkProfile,
    evm::{
        self,
        EvmChain,
        EvmNetwork,
        EvmWallet,
    },
    orchestrator::Orchestrator,
};
use tokio::time::{
    self,
    MissedTickBehavior,
};
use tracing::{
    info,
    warn,
};

pub struct AppConfig {
    pub profile: NetworkProfile,
    pub signer: LocalWallet,
    pub amount: String,
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let AppConfig {
        profile,
        signer,
        amount,
    } = config;
    let provider = evm::connect_provider(&profile)?;
    let wallet = EvmWallet::new(provider.clone(), signer, &profile);
    let identity = wallet.address();
    let chain = EvmChain::new(provider.clone(), &profile);
    let network = EvmNetwork::new(provider, &profile);
    info!(
        network = %profile,
        account = %format!("{:#x}", identity),
        "starting wager client"
    );

    let mut orchestrator =
        Orchestrator::new(chain, wallet, network, identity, profile.game_address);
    orchestrator.set_amount(amount);
    orchestrator.refresh().await;

    let mut ui_state = UiState::default();
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut orchestrator, &mut ui_state, &profile).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<R, B, N>(
    orchestrator: &mut Orchestrator<R, B, N>,
    ui_state: &mut UiState,
    profile: &NetworkProfile,
) -> Result<()>
where
    R: ChainReader,
    B: Broadcaster + Clone + 'static,
    N: NetworkEligibility,
{
    let mut input = ui::spawn_input_thread();
    let mut ticker = time::interval(profile.refresh_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let network = profile.to_string();
    let account = format!("{:#x}", orchestrator.identity());

    loop {
        let snapshot = orchestrator.snapshot();
        let view = View {
            network: network.clone(),
            account: account.clone(),
            symbol: &profile.token_symbol,
            snapshot: &snapshot,
        };
        ui::draw(ui_state, &view)?;

        let in_flight = orchestrator.has_in_flight();
        tokio::select! {
            Some(update) = orchestrator.next_update(), if in_flight => {
                orchestrator.apply(update).await;
            }
            _ = ticker.tick() => {
                orchestrator.refresh().await;
            }
            key = input.recv() => {
                let Some(key) = key else { break };
                let Some(event) = ui_state.handle_key(key) else { continue };
                if event == UserEvent::Quit {
                    break;
                }
                handle_event(orchestrator, event).await;
            }
        }
    }
    Ok(())
}

async fn handle_event<R, B, N>(orchestrator: &mut Orchestrator<R, B, N>, event: UserEvent)
where
    R: ChainReader,
    B: Broadcaster + Clone + 'static,
    N: NetworkEligibility,
{
    match event {
        UserEvent::AmountInput(_) | UserEvent::AmountBackspace => {
            if let Some(text) = ui::edit_amount(orchestrator.amount_text(), event) {
                orchestrator.set_amount(text);
            }
        }
        // rejections are kept on the snapshot for the status panel
        UserEvent::Approve => {
            let _ = orchestrator.issue_approval().await;
        }
        UserEvent::Spin => {
            let _ = orchestrator.issue_wager().await;
        }
        UserEvent::Refresh => orchestrator.refresh().await,
        UserEvent::SwitchNetwork => {
            if let Err(err) = orchestrator.request_network_switch().await {
                warn!(%err, "network still ineligible");
            }
        }
        UserEvent::Quit | UserEvent::Redraw => {}
    }
}
